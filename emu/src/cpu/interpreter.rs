use logger::log;
use vecfixed::VecFixed;

use crate::cpu::hardware::display::FrameBuffer;
use crate::cpu::hardware::internal_memory::{FONT_GLYPH_SIZE, InternalMemory, PROGRAM_START};
use crate::cpu::hardware::keypad::{KEY_COUNT, Keypad};
use crate::cpu::hardware::timers::Timers;
use crate::cpu::instruction::Instruction;
use crate::cpu::opcode::Opcode;
use crate::cpu::registers::Registers;
use crate::error::EmulatorError;
use crate::rom::Rom;

pub const SIZE_OF_INSTRUCTION: u16 = 2;
pub const MAX_STACK_DEPTH: usize = 16;

/// Capacity of the instruction-history ring buffer, when enabled.
const HISTORY_SIZE: usize = 2048;

/// The interpreter state and its cycle driver.
///
/// One value of this type is one emulation session: registers, memory,
/// stack, timers, keypad levels, frame buffer and the wait-for-key state
/// all hang off it, nothing lives in globals. [`step`](Self::step) runs
/// exactly one fetch/decode/execute cycle; timers are advanced separately
/// through [`Timers::tick`] on the embedder's own 60 Hz schedule.
pub struct Interpreter {
    memory: InternalMemory,
    pub registers: Registers,
    pub timers: Timers,
    keypad: Keypad,
    display: FrameBuffer,

    index: u16,
    pc: u16,
    stack: [u16; MAX_STACK_DEPTH],
    sp: usize,

    /// `Some(x)` while an `FX0A` is blocked on input: no cycle runs until
    /// a fresh key press is delivered and lands in `Vx`.
    awaiting_key: Option<usize>,

    cycles_emulated: u64,

    /// Optional diagnostic sink recording the mnemonic of every decoded
    /// instruction. Off by default, costs nothing until enabled.
    history: Option<VecFixed<HISTORY_SIZE, String>>,
}

impl Interpreter {
    pub fn new(rom: &Rom) -> Self {
        Self {
            memory: InternalMemory::with_rom(rom),
            registers: Registers::default(),
            timers: Timers::default(),
            keypad: Keypad::default(),
            display: FrameBuffer::default(),
            index: 0,
            pc: PROGRAM_START,
            stack: [0; MAX_STACK_DEPTH],
            sp: 0,
            awaiting_key: None,
            cycles_emulated: 0,
            history: None,
        }
    }

    /// Runs one full instruction cycle, or nothing at all while a
    /// wait-for-key is pending. Any `Err` is fatal for the session.
    pub fn step(&mut self) -> Result<(), EmulatorError> {
        if self.awaiting_key.is_some() {
            return Ok(());
        }

        let raw = self.memory.read_instruction(self.pc)?;
        let op_code = self.decode(raw)?;
        self.execute(op_code)
    }

    fn decode(&mut self, raw: u16) -> Result<Opcode, EmulatorError> {
        let code = Opcode::try_from(raw)?;
        log(format!("{code}"));

        if let Some(history) = self.history.as_mut() {
            history.push(code.instruction.to_string());
        }

        Ok(code)
    }

    fn execute(&mut self, op_code: Opcode) -> Result<(), EmulatorError> {
        use Instruction::*;

        // Handlers report how far pc moves once they are done: Some(2) for
        // straight-line instructions, Some(4) for a taken skip, None when
        // the instruction wrote pc itself.
        let bytes_to_advance = match op_code.instruction {
            ClearScreen => self.clear_screen(),
            Return => self.subroutine_return()?,
            Jump { nnn } => self.jump(nnn),
            Call { nnn } => self.call_subroutine(nnn)?,
            SkipIfEqualImm { x, kk } => self.skip_if(self.registers.register_at(x) == kk),
            SkipIfNotEqualImm { x, kk } => self.skip_if(self.registers.register_at(x) != kk),
            SkipIfEqual { x, y } => {
                self.skip_if(self.registers.register_at(x) == self.registers.register_at(y))
            }
            LoadImm { x, kk } => self.load_imm(x, kk),
            AddImm { x, kk } => self.add_imm(x, kk),
            Move { x, y } => self.move_register(x, y),
            Or { x, y } => self.or_register(x, y),
            And { x, y } => self.and_register(x, y),
            Xor { x, y } => self.xor_register(x, y),
            Add { x, y } => self.add_register(x, y),
            Sub { x, y } => self.sub_register(x, y),
            ShiftRight { x } => self.shift_right(x),
            SubNegated { x, y } => self.sub_negated(x, y),
            ShiftLeft { x } => self.shift_left(x),
            SkipIfNotEqual { x, y } => {
                self.skip_if(self.registers.register_at(x) != self.registers.register_at(y))
            }
            LoadIndex { nnn } => self.load_index(nnn),
            JumpWithOffset { nnn } => self.jump_with_offset(nnn),
            Random { x, kk } => self.random(x, kk),
            DrawSprite { x, y, n } => self.draw_sprite(x, y, n)?,
            SkipIfKeyPressed { x } => {
                self.skip_if(self.keypad.is_pressed(self.registers.register_at(x)))
            }
            SkipIfKeyNotPressed { x } => {
                self.skip_if(!self.keypad.is_pressed(self.registers.register_at(x)))
            }
            LoadDelayTimer { x } => self.load_delay_timer(x),
            WaitForKey { x } => self.wait_for_key(x),
            SetDelayTimer { x } => self.set_delay_timer(x),
            SetSoundTimer { x } => self.set_sound_timer(x),
            AddToIndex { x } => self.add_to_index(x),
            LoadGlyphAddress { x } => self.load_glyph_address(x),
            StoreBcd { x } => self.store_bcd(x)?,
            StoreRegisters { x } => self.store_registers(x)?,
            LoadRegisters { x } => self.load_registers(x)?,
        };

        if self.awaiting_key.is_some() {
            // FX0A has not completed: neither pc nor the cycle counter
            // moves until input delivery finishes the instruction.
            return Ok(());
        }

        self.pc = self.pc.wrapping_add(bytes_to_advance.unwrap_or(0));
        self.cycles_emulated += 1;

        Ok(())
    }

    /// Delivers one key press/release level from the input collaborator.
    ///
    /// A pending wait-for-key resolves only on a fresh edge: the key was
    /// up in the latch and is delivered pressed. Releases and keys already
    /// held do nothing to the wait. Resolution stores the key in `Vx`,
    /// completes the blocked instruction (pc and cycle counter advance)
    /// and returns the machine to normal execution. The latch update and
    /// the wait check share this one exclusive borrow, so no cycle can
    /// execute in between.
    pub fn update_user_input(&mut self, key: u8, pressed: bool) {
        if let Some(x) = self.awaiting_key {
            if pressed && (key as usize) < KEY_COUNT && !self.keypad.is_pressed(key) {
                self.registers.set_register_at(x, key);
                self.awaiting_key = None;
                self.pc = self.pc.wrapping_add(SIZE_OF_INSTRUCTION);
                self.cycles_emulated += 1;
            }
        }

        self.keypad.set_key(key, pressed);
    }

    /// Whole-keypad variant of [`update_user_input`](Self::update_user_input):
    /// applies the levels in key order, so the lowest newly pressed key
    /// resolves a pending wait.
    pub fn update_keys(&mut self, keys: &[bool; KEY_COUNT]) {
        for (key, &pressed) in keys.iter().enumerate() {
            self.update_user_input(key as u8, pressed);
        }
    }

    pub fn screen(&self) -> &FrameBuffer {
        &self.display
    }

    pub fn take_draw_flag(&mut self) -> bool {
        self.display.take_draw_flag()
    }

    pub fn is_beeping(&self) -> bool {
        self.timers.is_beeping()
    }

    pub fn cycles_emulated(&self) -> u64 {
        self.cycles_emulated
    }

    /// Turns on the instruction-history sink (and resets it when already
    /// on).
    pub fn enable_instr_history(&mut self) {
        self.history = Some(VecFixed::new());
    }

    /// The recorded mnemonics, oldest first, one per line. Empty while the
    /// sink is disabled.
    pub fn instr_history(&self) -> String {
        self.history
            .as_ref()
            .map(|history| history.join("\n"))
            .unwrap_or_default()
    }
}

// Instruction handlers.
impl Interpreter {
    fn clear_screen(&mut self) -> Option<u16> {
        self.display.clear();
        Some(SIZE_OF_INSTRUCTION)
    }

    fn subroutine_return(&mut self) -> Result<Option<u16>, EmulatorError> {
        if self.sp == 0 {
            return Err(EmulatorError::StackUnderflow { pc: self.pc });
        }

        self.sp -= 1;
        self.pc = self.stack[self.sp];

        // The popped address is the CALL instruction itself; the normal
        // advance steps over it onto the instruction after the call site.
        Ok(Some(SIZE_OF_INSTRUCTION))
    }

    fn jump(&mut self, nnn: u16) -> Option<u16> {
        self.pc = nnn;
        None
    }

    fn call_subroutine(&mut self, nnn: u16) -> Result<Option<u16>, EmulatorError> {
        if self.sp == MAX_STACK_DEPTH {
            return Err(EmulatorError::StackOverflow { pc: self.pc });
        }

        self.stack[self.sp] = self.pc;
        self.sp += 1;
        self.pc = nnn;

        Ok(None)
    }

    fn skip_if(&self, condition: bool) -> Option<u16> {
        if condition {
            Some(2 * SIZE_OF_INSTRUCTION)
        } else {
            Some(SIZE_OF_INSTRUCTION)
        }
    }

    fn load_imm(&mut self, x: usize, kk: u8) -> Option<u16> {
        self.registers.set_register_at(x, kk);
        Some(SIZE_OF_INSTRUCTION)
    }

    fn add_imm(&mut self, x: usize, kk: u8) -> Option<u16> {
        // Wraps without touching the flags register.
        let value = self.registers.register_at(x).wrapping_add(kk);
        self.registers.set_register_at(x, value);
        Some(SIZE_OF_INSTRUCTION)
    }

    fn move_register(&mut self, x: usize, y: usize) -> Option<u16> {
        self.registers
            .set_register_at(x, self.registers.register_at(y));
        Some(SIZE_OF_INSTRUCTION)
    }

    fn or_register(&mut self, x: usize, y: usize) -> Option<u16> {
        let value = self.registers.register_at(x) | self.registers.register_at(y);
        self.registers.set_register_at(x, value);
        Some(SIZE_OF_INSTRUCTION)
    }

    fn and_register(&mut self, x: usize, y: usize) -> Option<u16> {
        let value = self.registers.register_at(x) & self.registers.register_at(y);
        self.registers.set_register_at(x, value);
        Some(SIZE_OF_INSTRUCTION)
    }

    fn xor_register(&mut self, x: usize, y: usize) -> Option<u16> {
        let value = self.registers.register_at(x) ^ self.registers.register_at(y);
        self.registers.set_register_at(x, value);
        Some(SIZE_OF_INSTRUCTION)
    }

    fn add_register(&mut self, x: usize, y: usize) -> Option<u16> {
        let (value, carry) = self
            .registers
            .register_at(x)
            .overflowing_add(self.registers.register_at(y));
        self.registers.set_register_at(x, value);
        self.registers.set_flags(u8::from(carry));
        Some(SIZE_OF_INSTRUCTION)
    }

    fn sub_register(&mut self, x: usize, y: usize) -> Option<u16> {
        let vx = self.registers.register_at(x);
        let vy = self.registers.register_at(y);
        self.registers.set_register_at(x, vx.wrapping_sub(vy));
        self.registers.set_flags(u8::from(vx > vy));
        Some(SIZE_OF_INSTRUCTION)
    }

    fn shift_right(&mut self, x: usize) -> Option<u16> {
        let vx = self.registers.register_at(x);
        self.registers.set_register_at(x, vx >> 1);
        self.registers.set_flags(vx & 1);
        Some(SIZE_OF_INSTRUCTION)
    }

    fn sub_negated(&mut self, x: usize, y: usize) -> Option<u16> {
        let vx = self.registers.register_at(x);
        let vy = self.registers.register_at(y);
        self.registers.set_register_at(x, vy.wrapping_sub(vx));
        self.registers.set_flags(u8::from(vy > vx));
        Some(SIZE_OF_INSTRUCTION)
    }

    fn shift_left(&mut self, x: usize) -> Option<u16> {
        let vx = self.registers.register_at(x);
        self.registers.set_register_at(x, vx << 1);
        self.registers.set_flags(u8::from(vx >= 0x80));
        Some(SIZE_OF_INSTRUCTION)
    }

    fn load_index(&mut self, nnn: u16) -> Option<u16> {
        self.index = nnn;
        Some(SIZE_OF_INSTRUCTION)
    }

    fn jump_with_offset(&mut self, nnn: u16) -> Option<u16> {
        self.pc = nnn.wrapping_add(self.registers.register_at(0) as u16);
        None
    }

    fn random(&mut self, x: usize, kk: u8) -> Option<u16> {
        self.registers.set_register_at(x, rand::random::<u8>() & kk);
        Some(SIZE_OF_INSTRUCTION)
    }

    fn draw_sprite(&mut self, x: usize, y: usize, n: u8) -> Result<Option<u16>, EmulatorError> {
        let origin_x = self.registers.register_at(x);
        let origin_y = self.registers.register_at(y);

        let sprite = self.memory.read_slice(self.index as usize, n as usize)?;
        let erased = self.display.draw_sprite(origin_x, origin_y, sprite);
        self.registers.set_flags(u8::from(erased));

        Ok(Some(SIZE_OF_INSTRUCTION))
    }

    fn load_delay_timer(&mut self, x: usize) -> Option<u16> {
        self.registers.set_register_at(x, self.timers.delay());
        Some(SIZE_OF_INSTRUCTION)
    }

    fn wait_for_key(&mut self, x: usize) -> Option<u16> {
        self.awaiting_key = Some(x);
        None
    }

    fn set_delay_timer(&mut self, x: usize) -> Option<u16> {
        self.timers.set_delay(self.registers.register_at(x));
        Some(SIZE_OF_INSTRUCTION)
    }

    fn set_sound_timer(&mut self, x: usize) -> Option<u16> {
        self.timers.set_sound(self.registers.register_at(x));
        Some(SIZE_OF_INSTRUCTION)
    }

    fn add_to_index(&mut self, x: usize) -> Option<u16> {
        // No flag on index wraparound, the register simply wraps.
        self.index = self
            .index
            .wrapping_add(self.registers.register_at(x) as u16);
        Some(SIZE_OF_INSTRUCTION)
    }

    fn load_glyph_address(&mut self, x: usize) -> Option<u16> {
        self.index = FONT_GLYPH_SIZE * self.registers.register_at(x) as u16;
        Some(SIZE_OF_INSTRUCTION)
    }

    fn store_bcd(&mut self, x: usize) -> Result<Option<u16>, EmulatorError> {
        let value = self.registers.register_at(x);
        let i = self.index as usize;

        self.memory.write_at(i, value / 100)?;
        self.memory.write_at(i + 1, (value / 10) % 10)?;
        self.memory.write_at(i + 2, value % 10)?;

        Ok(Some(SIZE_OF_INSTRUCTION))
    }

    fn store_registers(&mut self, x: usize) -> Result<Option<u16>, EmulatorError> {
        for reg in 0..=x {
            self.memory
                .write_at(self.index as usize + reg, self.registers.register_at(reg))?;
        }

        Ok(Some(SIZE_OF_INSTRUCTION))
    }

    fn load_registers(&mut self, x: usize) -> Result<Option<u16>, EmulatorError> {
        for reg in 0..=x {
            let value = self.memory.read_at(self.index as usize + reg)?;
            self.registers.set_register_at(reg, value);
        }

        Ok(Some(SIZE_OF_INSTRUCTION))
    }
}
