pub const KEY_COUNT: usize = 16;

/// Level state of the 16-key hex pad.
///
/// Key indices follow the conventional 4x4 layout:
///
/// ```text
/// 1 2 3 C
/// 4 5 6 D
/// 7 8 9 E
/// A 0 B F
/// ```
///
/// How host keys map onto these indices is the embedder's business; the
/// core only sees pressed/released levels. Edge detection for the
/// wait-for-key instruction happens in the interpreter, which compares the
/// delivered state against the levels latched here.
#[derive(Default)]
pub struct Keypad {
    keys: [bool; KEY_COUNT],
}

impl Keypad {
    /// Keys outside 0-15 do not exist and always read as released.
    pub fn is_pressed(&self, key: u8) -> bool {
        self.keys.get(key as usize).copied().unwrap_or(false)
    }

    pub fn set_key(&mut self, key: u8, pressed: bool) {
        if let Some(state) = self.keys.get_mut(key as usize) {
            *state = pressed;
        }
    }
}
