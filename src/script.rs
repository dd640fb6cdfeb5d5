//! Script parsing.
//!
//! A script is a tabular description of a multi-threaded scenario:
//!
//! - each **line** (newline-delimited) is one synchronization round;
//! - each line holds one **column** per thread, separated by `|`;
//! - each column is a compound statement, `;`-delimited.
//!
//! ```text
//! add 1        | wait go
//! signal go    | count = 1
//! ```
//!
//! Parsing transposes the line/column matrix into one ordered program per
//! thread. Columns are trimmed of surrounding whitespace, so scripts can be
//! aligned for readability. An empty column is a valid empty statement (the
//! no-op instruction matches it).

use crate::error::ScriptError;

/// A parsed script: one ordered sequence of compound statements per thread.
#[derive(Debug, Clone)]
pub struct Script {
    /// programs[thread][line] = compound statement.
    programs: Vec<Vec<String>>,
}

impl Script {
    /// Parse raw script text.
    ///
    /// The thread count is the column count of the first line. Every line
    /// must have the same column count; a mismatch fails with
    /// [`ScriptError::UnevenColumns`] before any thread is started.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let text = text.trim();

        let lines: Vec<Vec<String>> = text
            .lines()
            .map(|line| line.split('|').map(|col| col.trim().to_string()).collect())
            .collect();

        // A blank script degenerates to one thread running one empty
        // statement, same as a script consisting of a single empty column.
        if lines.is_empty() {
            return Ok(Self {
                programs: vec![vec![String::new()]],
            });
        }

        let expected = lines[0].len();
        for (index, line) in lines.iter().enumerate() {
            if line.len() != expected {
                return Err(ScriptError::UnevenColumns {
                    line: index + 1,
                    expected,
                    found: line.len(),
                });
            }
        }

        // Transpose: thread i runs column i of every line, in line order.
        let programs = (0..expected)
            .map(|col| lines.iter().map(|line| line[col].clone()).collect())
            .collect();

        Ok(Self { programs })
    }

    /// Number of threads (= column count).
    pub fn thread_count(&self) -> usize {
        self.programs.len()
    }

    /// Number of script lines (= synchronization rounds).
    pub fn line_count(&self) -> usize {
        self.programs.first().map_or(0, Vec::len)
    }

    /// Per-thread programs, indexed by thread then line.
    pub fn programs(&self) -> &[Vec<String>] {
        &self.programs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transposes_columns() {
        let script = Script::parse("a | b\nc | d\ne | f").unwrap();

        assert_eq!(script.thread_count(), 2);
        assert_eq!(script.line_count(), 3);
        assert_eq!(script.programs()[0], vec!["a", "c", "e"]);
        assert_eq!(script.programs()[1], vec!["b", "d", "f"]);
    }

    #[test]
    fn test_parse_trims_columns_and_script() {
        let script = Script::parse("\n\n   first stmt |  other\n   second |  last  \n\n").unwrap();

        assert_eq!(script.programs()[0], vec!["first stmt", "second"]);
        assert_eq!(script.programs()[1], vec!["other", "last"]);
    }

    #[test]
    fn test_parse_uneven_columns() {
        let err = Script::parse("a | b\nc").unwrap_err();
        match err {
            ScriptError::UnevenColumns {
                line,
                expected,
                found,
            } => {
                assert_eq!(line, 2);
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected UnevenColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_columns() {
        // Two consecutive separators and a trailing separator both yield
        // empty statements.
        let script = Script::parse("a || c |").unwrap();

        assert_eq!(script.thread_count(), 4);
        assert_eq!(script.programs()[1], vec![""]);
        assert_eq!(script.programs()[3], vec![""]);
    }

    #[test]
    fn test_parse_single_line() {
        let script = Script::parse("a | b | c").unwrap();
        assert_eq!(script.thread_count(), 3);
        assert_eq!(script.line_count(), 1);
    }

    #[test]
    fn test_parse_single_column() {
        let script = Script::parse("a\nb\nc").unwrap();
        assert_eq!(script.thread_count(), 1);
        assert_eq!(script.programs()[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_blank_script() {
        let script = Script::parse("  \n  ").unwrap();
        assert_eq!(script.thread_count(), 1);
        assert_eq!(script.line_count(), 1);
        assert_eq!(script.programs()[0], vec![""]);
    }
}
