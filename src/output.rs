//! Result formatting for the query command

use crate::index::types::MatchRecord;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Print ranked matches to stdout, one filename per line
pub fn print_matches(matches: &[MatchRecord], color: bool, counts: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);
    write_matches(&mut stdout, matches, counts)
}

/// Write matches as `filename` or `filename:count`
pub fn write_matches<W: WriteColor>(
    out: &mut W,
    matches: &[MatchRecord],
    counts: bool,
) -> io::Result<()> {
    for m in matches {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(out, "{}", m.filename)?;
        out.reset()?;

        // boolean and match-all results carry no count
        if counts && m.occurrence_count > 0 {
            write!(out, ":")?;
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            write!(out, "{}", m.occurrence_count)?;
            out.reset()?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::NoColor;

    #[test]
    fn test_write_matches() {
        let matches = vec![MatchRecord::new("a.txt", 3), MatchRecord::new("b.txt", 0)];

        let mut out = NoColor::new(Vec::new());
        write_matches(&mut out, &matches, true).unwrap();
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "a.txt:3\nb.txt\n");

        let mut out = NoColor::new(Vec::new());
        write_matches(&mut out, &matches, false).unwrap();
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "a.txt\nb.txt\n");
    }
}
