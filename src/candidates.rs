//! Candidate sources and the filtering contract.
//!
//! Every source feeds the pipeline through [`is_valid_candidate`]: names
//! containing filter metacharacters never reach a worker.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;

/// Characters that would break or subvert the ping filter.
pub const FORBIDDEN_CHARS: &str = "\"/\\:;|=,+*?<>";

pub fn is_valid_candidate(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| FORBIDDEN_CHARS.contains(c))
}

/// Lazy line iterator over a memory-mapped candidate file.
pub struct MmapLines {
    map: Mmap,
    pos: usize,
}

impl MmapLines {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("can't open {}", path.display()))?;
        let map = unsafe { Mmap::map(&file) }
            .with_context(|| format!("can't map {}", path.display()))?;
        Ok(Self { map, pos: 0 })
    }
}

impl Iterator for MmapLines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.pos >= self.map.len() {
            return None;
        }
        let rest = &self.map[self.pos..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        self.pos += end + 1;
        let mut line = &rest[..end];
        if line.ends_with(b"\r") {
            line = &line[..line.len() - 1];
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }
}

/// Candidate source: mmap'd file when a path is given, stdin otherwise.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn Iterator<Item = String> + Send>> {
    match path {
        Some(path) => Ok(Box::new(MmapLines::open(path)?)),
        None => Ok(Box::new(
            BufReader::new(io::stdin()).lines().map_while(io::Result::ok),
        )),
    }
}

/// Hit destination: file when a path is given, stdout otherwise.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("can't create {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout())),
    }
}
