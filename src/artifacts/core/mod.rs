//! Shared output plumbing

use derive_new::new;
use minus::Pager;
use std::io::{self, Write};

/// Repository writer that buffers into a `minus` pager
///
/// `log` output goes here when stdout is a terminal; the binary pages the
/// buffered text once the command returns.
#[derive(new)]
pub struct PagerWriter {
    pager: Pager,
}

impl Write for PagerWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s =
            std::str::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.pager.push_str(s).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
