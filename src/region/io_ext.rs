//! Positional (pread/pwrite-style) file access.
//!
//! Every read and write in the region file goes through these helpers
//! instead of `Seek` + `Read`/`Write`, because `Region`'s methods take
//! `&self`: multiple threads share one `File` handle, and a shared seek
//! cursor would race across them.

use std::fs::File;
use std::io;

#[cfg(unix)]
pub fn read_at(file: &File, pos: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, pos)
}

#[cfg(unix)]
pub fn write_at(file: &File, pos: u64, buf: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, pos)
}

#[cfg(windows)]
pub fn read_at(file: &File, mut pos: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut done = 0;
    while done < buf.len() {
        let n = file.seek_read(&mut buf[done..], pos)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected EOF"));
        }
        done += n;
        pos += n as u64;
    }
    Ok(())
}

#[cfg(windows)]
pub fn write_at(file: &File, mut pos: u64, buf: &[u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut done = 0;
    while done < buf.len() {
        let n = file.seek_write(&buf[done..], pos)?;
        done += n;
        pos += n as u64;
    }
    Ok(())
}
