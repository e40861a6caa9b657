// Command-line argument parsing for bootloader
//
// Features:
// - Whitespace-separated arguments
// - Key-value pairs (key=value)
// - Double-quoted values keep their spaces (key="a b")
// - Unknown parameter skipping (error-tolerant)

use arrayvec::ArrayVec;

/// Arguments beyond this count are dropped
pub const MAX_ARGS: usize = 32;

pub struct CmdLine<'a> {
    args: ArrayVec<&'a str, MAX_ARGS>,
}

impl<'a> CmdLine<'a> {
    /// Split a bootline into arguments in a single pass
    pub fn parse(line: &'a str) -> Self {
        let mut args = ArrayVec::new();
        let bytes = line.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i == bytes.len() {
                break;
            }

            let start = i;
            let mut quoted = false;
            while i < bytes.len() {
                match bytes[i] {
                    b'"' => quoted = !quoted,
                    b if b.is_ascii_whitespace() && !quoted => break,
                    _ => {}
                }
                i += 1;
            }

            if args.try_push(&line[start..i]).is_err() {
                log::warn!("cmdline: more than {} arguments, rest ignored", MAX_ARGS);
                break;
            }
        }

        Self { args }
    }

    /// Get argument at index
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }

    /// Check if flag exists
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| *arg == flag)
    }

    /// Get value for option with key=value format, quotes stripped
    pub fn get_key_value(&self, key: &str) -> Option<&'a str> {
        self.args.iter().find_map(|arg| {
            let (k, v) = split_pair(arg)?;
            (k == key).then_some(v)
        })
    }

    /// Iterate arguments in order
    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.args.iter().copied()
    }

    /// Get number of arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Split `key=value`, removing one layer of double quotes around the value
pub fn split_pair(arg: &str) -> Option<(&str, &str)> {
    let (key, value) = arg.split_once('=')?;
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some((key, value))
}

/// Parse a decimal or `0x`-prefixed hexadecimal number
pub fn parse_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let cmd = CmdLine::parse("  verbose   strict-tag\tmemory=create ");
        assert_eq!(cmd.len(), 3);
        assert!(cmd.has_flag("verbose"));
        assert_eq!(cmd.get_key_value("memory"), Some("create"));
        assert_eq!(cmd.get_key_value("missing"), None);
    }

    #[test]
    fn test_quoted_value_keeps_spaces() {
        let cmd = CmdLine::parse(r#"bootargs="console=ttyS0 root=/dev/ram" debug"#);
        assert_eq!(cmd.len(), 2);
        assert_eq!(cmd.get_key_value("bootargs"), Some("console=ttyS0 root=/dev/ram"));
        assert!(cmd.has_flag("debug"));
    }

    #[test]
    fn test_empty_line() {
        assert!(CmdLine::parse("   ").is_empty());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x2000000"), Some(0x0200_0000));
        assert_eq!(parse_number("64"), Some(64));
        assert_eq!(parse_number("0xzz"), None);
    }
}
