// Hostforge
// Copyright (C) 2024 - hostforge contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

use inline_colorization::{color_green, color_red, color_reset, color_yellow};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Verbosity-gated terminal logger. Warnings and errors always print (to
/// stderr); info and debug are gated on the verbosity level.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub verbosity: u32,
}

impl Output {
    pub fn new(verbosity: u32) -> Self {
        Self { verbosity }
    }

    pub fn quiet() -> Self {
        Self { verbosity: 0 }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug if self.verbosity >= 2 => println!("DEBUG: {}", message),
            LogLevel::Info if self.verbosity >= 1 => {
                println!("{color_green}INFO{color_reset}: {}", message)
            }
            LogLevel::Warning => eprintln!("{color_yellow}WARN{color_reset}: {}", message),
            LogLevel::Error => eprintln!("{color_red}ERROR{color_reset}: {}", message),
            _ => {}
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_does_not_panic_at_any_verbosity() {
        for v in 0..3 {
            let out = Output::new(v);
            out.debug("debug line");
            out.info("info line");
            out.warning("warning line");
            out.error("error line");
        }
    }
}
