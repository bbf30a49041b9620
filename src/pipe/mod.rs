//! Named-pipe command channel.
//!
//! External tools write one command per line:
//!
//! ```text
//! <port>/<device>/<control> <value>\n
//! ```
//!
//! The bridge is the only reader. [`fifo::PipeChannel`] owns the FIFO and the
//! reader thread; this module holds the line grammar.

pub mod fifo;

pub use fifo::{PipeChannel, PipeError};

/// A line that matches the strict four-field command grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub port: &'a str,
    pub device: &'a str,
    pub control: &'a str,
    pub value: &'a str,
}

impl<'a> CommandLine<'a> {
    /// `port`, `device` and `control` are `[A-Za-z0-9_]+`; `value` is the
    /// non-empty remainder after the first space.
    pub fn parse(line: &'a str) -> Option<Self> {
        let (path, value) = line.split_once(' ')?;
        if value.is_empty() || value.contains('\n') {
            return None;
        }

        let mut fields = path.splitn(3, '/');
        let port = fields.next().filter(|f| is_word(f))?;
        let device = fields.next().filter(|f| is_word(f))?;
        let control = fields.next().filter(|f| is_word(f))?;

        Some(Self {
            port,
            device,
            control,
            value,
        })
    }
}

/// Splits a line into (topic, payload) at the first space, whatever the grammar.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    line.split_once(' ')
}

fn is_word(field: &str) -> bool {
    !field.is_empty()
        && field
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_four_fields() {
        let line = CommandLine::parse("Virtual/bedside_switch/enabled on now").unwrap();
        assert_eq!(line.port, "Virtual");
        assert_eq!(line.device, "bedside_switch");
        assert_eq!(line.control, "enabled");
        assert_eq!(line.value, "on now");
    }

    #[test]
    fn grammar_rejects_dashes_and_extra_segments() {
        assert_eq!(CommandLine::parse("RS-485-2/A1/Relay_1 true"), None);
        assert_eq!(CommandLine::parse("/devices/A1/controls/Relay_1 1"), None);
        assert_eq!(CommandLine::parse("Virtual/A1/Relay_1/on 1"), None);
        assert_eq!(CommandLine::parse("Virtual/A1 1"), None);
        assert_eq!(CommandLine::parse("Virtual/A1/Relay_1"), None);
        assert_eq!(CommandLine::parse("Virtual/A1/Relay_1 "), None);
        assert_eq!(CommandLine::parse("Virtual//Relay_1 1"), None);
    }

    #[test]
    fn split_ignores_grammar() {
        assert_eq!(
            split_line("RS-485-2/A1/Relay_1 true"),
            Some(("RS-485-2/A1/Relay_1", "true"))
        );
        assert_eq!(
            split_line("/devices/A1/controls/Relay_1 1 2"),
            Some(("/devices/A1/controls/Relay_1", "1 2"))
        );
        assert_eq!(split_line("no-payload"), None);
    }
}
