//! Reversible frame obfuscation
//!
//! The first character of an encoded frame is a decimal digit key `K`.
//! Every following character is shifted by `K + 1` code points. This is
//! a client contract, not a security boundary.

/// Highest key the encoder emits; keys cycle 1..=KEY_COUNT-1
const KEY_COUNT: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("Empty frame")]
    Empty,
    #[error("Invalid key character '{0}'")]
    InvalidKey(char),
    #[error("Shift produced an invalid code point at offset {0}")]
    InvalidCodePoint(usize),
}

/// Per-connection shift cipher with an encoder key cursor
#[derive(Debug, Clone)]
pub struct Cipher {
    last_key: u32,
}

impl Default for Cipher {
    fn default() -> Self {
        Self::new()
    }
}

impl Cipher {
    pub fn new() -> Self {
        // First emitted key is 1
        Self { last_key: 0 }
    }

    /// Advance the key cursor: 1 -> 2 -> ... -> 8 -> 1
    fn next_key(&mut self) -> u32 {
        let mut key = (self.last_key + 1) % KEY_COUNT;
        if key == 0 {
            key = 1;
        }
        self.last_key = key;
        key
    }

    /// Encode `plain` with the next key in the cycle
    pub fn encrypt(&mut self, plain: &str) -> Result<String, CipherError> {
        let key = self.next_key();
        let mut out = String::with_capacity(plain.len() + 1);
        out.push(char::from_digit(key, 10).ok_or(CipherError::InvalidKey('?'))?);
        for (offset, c) in plain.chars().enumerate() {
            let shifted = (c as u32)
                .checked_add(key + 1)
                .and_then(char::from_u32)
                .ok_or(CipherError::InvalidCodePoint(offset))?;
            out.push(shifted);
        }
        Ok(out)
    }

    /// Decode a frame whose first character carries the key
    ///
    /// Any decimal digit is accepted as a key, including 0 and 9 which the
    /// encoder never emits.
    pub fn decrypt(&self, frame: &str) -> Result<String, CipherError> {
        let mut chars = frame.chars();
        let key_char = chars.next().ok_or(CipherError::Empty)?;
        let key = key_char
            .to_digit(10)
            .ok_or(CipherError::InvalidKey(key_char))?;

        let mut out = String::with_capacity(frame.len().saturating_sub(1));
        for (offset, c) in chars.enumerate() {
            let shifted = (c as u32)
                .checked_sub(key + 1)
                .and_then(char::from_u32)
                .ok_or(CipherError::InvalidCodePoint(offset))?;
            out.push(shifted);
        }
        Ok(out)
    }
}
