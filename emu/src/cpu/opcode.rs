use std::fmt::{Display, Formatter};
use std::ops::Deref;

use crate::cpu::instruction::Instruction;
use crate::error::EmulatorError;

/// A fetched 16bit opcode: the decoded [`Instruction`] plus the raw word it
/// came from, kept around for diagnostics.
pub struct Opcode {
    pub instruction: Instruction,
    pub raw: u16,
}

impl TryFrom<u16> for Opcode {
    type Error = EmulatorError;

    fn try_from(op_code: u16) -> Result<Self, Self::Error> {
        Ok(Self {
            instruction: Instruction::try_from(op_code)?,
            raw: op_code,
        })
    }
}

impl Deref for Opcode {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let instruction = self.instruction.to_string();
        let instruction = format!("INS: {instruction}\n");

        let bytes_pos1 = "POS: |..........1 ..................0|\n";
        let bytes_pos2 = "     |5_4_3_2_1_0_9_8_7_6_5_4_3_2_1_0|\n";

        use Instruction::*;
        let op_code_format: &str = match &self.instruction {
            ClearScreen | Return => "FMT: |0_0_0_0|_________fixed_________|",
            Jump { .. } | Call { .. } | LoadIndex { .. } | JumpWithOffset { .. } => {
                "FMT: |__op___|_________N_N_N_________|"
            }
            SkipIfEqualImm { .. } | SkipIfNotEqualImm { .. } | LoadImm { .. }
            | AddImm { .. } | Random { .. } => "FMT: |__op___|___X___|______K_K______|",
            SkipIfEqual { .. } | SkipIfNotEqual { .. } => {
                "FMT: |__op___|___X___|___Y___|0_0_0_0|"
            }
            Move { .. } | Or { .. } | And { .. } | Xor { .. } | Add { .. } | Sub { .. }
            | ShiftRight { .. } | SubNegated { .. } | ShiftLeft { .. } => {
                "FMT: |1_0_0_0|___X___|___Y___|__sub__|"
            }
            DrawSprite { .. } => "FMT: |1_1_0_1|___X___|___Y___|___N___|",
            SkipIfKeyPressed { .. } | SkipIfKeyNotPressed { .. } => {
                "FMT: |1_1_1_0|___X___|______sub______|"
            }
            LoadDelayTimer { .. } | WaitForKey { .. } | SetDelayTimer { .. }
            | SetSoundTimer { .. } | AddToIndex { .. } | LoadGlyphAddress { .. }
            | StoreBcd { .. } | StoreRegisters { .. } | LoadRegisters { .. } => {
                "FMT: |1_1_1_1|___X___|______sub______|"
            }
        };

        let mut raw_bits = String::new();
        for i in format!("{:#018b}", self.raw).chars().skip(2) {
            raw_bits.push(i);
            raw_bits.push('_');
        }
        raw_bits.pop();
        let raw_bits = format!("RAW: |{raw_bits}|\n");

        writeln!(
            f,
            "{instruction}{bytes_pos1}{bytes_pos2}{raw_bits}{op_code_format}"
        )
    }
}
