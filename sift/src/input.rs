use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use sift_core::RawConnection;

/// Newline-delimited connection strings; blank lines and `#` comments skipped.
pub fn read_lines<R: BufRead>(reader: R, source: &str) -> Result<Vec<RawConnection>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let t = line.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        out.push(RawConnection::new(t, source));
    }
    Ok(out)
}

pub fn read_inputs(files: &[impl AsRef<Path>], stdin: bool) -> Result<Vec<RawConnection>> {
    let mut all = Vec::new();
    for path in files {
        let path = path.as_ref();
        let fh = File::open(path).with_context(|| format!("opening input {}", path.display()))?;
        let lines = read_lines(BufReader::new(fh), &path.display().to_string())
            .with_context(|| format!("reading input {}", path.display()))?;
        all.extend(lines);
    }
    if stdin {
        all.extend(read_lines(io::stdin().lock(), "stdin").context("reading stdin")?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn skips_comments_and_blanks() {
        let text = "# feed\n\n  trojan://pw@a.test:443  \n#trojan://x@b.test:1\nss://abc\n";
        let got = read_lines(Cursor::new(text), "feed.txt").unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].raw, "trojan://pw@a.test:443");
        assert_eq!(got[1].source, "feed.txt");
    }

    #[test]
    fn files_carry_their_path_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        writeln!(File::create(&a).unwrap(), "vmess://one").unwrap();
        writeln!(File::create(&b).unwrap(), "vmess://two\nvmess://three").unwrap();
        let got = read_inputs(&[&a, &b], false).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].source, a.display().to_string());
        assert_eq!(got[2].source, b.display().to_string());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_inputs(&["/definitely/not/here.txt"], false).unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.txt"));
    }
}
