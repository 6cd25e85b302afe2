//! Odometer-style candidate generator.
//!
//! Alternative candidate source for short-name sweeps: enumerates every
//! fixed-length string over a charset, one advance per `next()`.

use anyhow::{ensure, Result};

pub struct NameGen {
    charset: Vec<char>,
    digits: Vec<usize>,
    first: bool,
    exhausted: bool,
}

impl NameGen {
    pub fn new(charset: &str, length: usize) -> Result<Self> {
        ensure!(!charset.is_empty(), "generator charset is empty");
        ensure!(length > 0, "generator length must be at least 1");
        Ok(Self {
            charset: charset.chars().collect(),
            digits: vec![0; length],
            first: true,
            exhausted: false,
        })
    }

    /// Total number of names this generator will emit.
    pub fn complexity(&self) -> u128 {
        (self.charset.len() as u128).pow(self.digits.len() as u32)
    }

    fn current(&self) -> String {
        self.digits.iter().map(|&i| self.charset[i]).collect()
    }
}

impl Iterator for NameGen {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.exhausted {
            return None;
        }
        if self.first {
            self.first = false;
            return Some(self.current());
        }
        // Increment from the least significant position, carrying left;
        // a carry out of position zero means the sweep is complete.
        let mut pos = self.digits.len();
        loop {
            if pos == 0 {
                self.exhausted = true;
                return None;
            }
            pos -= 1;
            self.digits[pos] += 1;
            if self.digits[pos] < self.charset.len() {
                break;
            }
            self.digits[pos] = 0;
        }
        Some(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerates_full_space_in_order() {
        let names: Vec<String> = NameGen::new("ab", 2).unwrap().collect();
        assert_eq!(names, ["aa", "ab", "ba", "bb"]);
    }

    #[test]
    fn stays_exhausted() {
        let mut gen = NameGen::new("xy", 1).unwrap();
        assert_eq!(gen.by_ref().count(), 2);
        assert_eq!(gen.next(), None);
        assert_eq!(gen.next(), None);
    }

    #[test]
    fn complexity_is_charset_to_the_length() {
        let gen = NameGen::new("abcdefghijklmnopqrstuvwxyz", 3).unwrap();
        assert_eq!(gen.complexity(), 26u128.pow(3));
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(NameGen::new("", 3).is_err());
        assert!(NameGen::new("ab", 0).is_err());
    }
}
