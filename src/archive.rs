//! Forward-only iteration over the entries of one layer tar

use std::io::{self, Read};
use tar::{Archive, Entries, Entry, EntryType};
use tracing::{trace, warn};

use crate::paths;
use crate::whiteout;
use crate::{Error, Result};

/// What an archive entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    HardLink,
    /// `.wh.` marker: a deletion, not content.
    Whiteout,
    CharDevice,
    BlockDevice,
    Fifo,
    Other,
}

/// A layer payload (already decompressed) read as a tar archive.
pub struct LayerArchive<R: Read> {
    archive: Archive<R>,
}

impl<R: Read> LayerArchive<R> {
    pub fn new(reader: R) -> Self {
        LayerArchive {
            archive: Archive::new(reader),
        }
    }

    /// Start iterating. The archive can only be walked once.
    pub fn entries(&mut self) -> Result<LayerEntries<'_, R>> {
        let entries = self.archive.entries().map_err(Error::ArchiveRead)?;
        Ok(LayerEntries {
            entries,
            position: 0,
            interruption: None,
            done: false,
        })
    }
}

/// Lazy sequence of [`ArchiveEntry`] values.
///
/// A read error ends the sequence instead of failing it: the error is logged,
/// kept for [`LayerEntries::interruption`], and everything yielded before it
/// remains valid.
pub struct LayerEntries<'a, R: 'a + Read> {
    entries: Entries<'a, R>,
    position: usize,
    interruption: Option<io::Error>,
    done: bool,
}

impl<'a, R: Read> LayerEntries<'a, R> {
    /// The error that cut the archive short, if any.
    pub fn interruption(&self) -> Option<&io::Error> {
        self.interruption.as_ref()
    }

    /// Number of entries yielded so far.
    pub fn position(&self) -> usize {
        self.position
    }

    fn stop(&mut self, err: io::Error) {
        warn!(entries_read = self.position, "error reading tar: {}", err);
        self.interruption = Some(err);
        self.done = true;
    }
}

impl<'a, R: Read> Iterator for LayerEntries<'a, R> {
    type Item = ArchiveEntry<'a, R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let entry = match self.entries.next() {
            None => {
                self.done = true;
                return None;
            }
            Some(entry) => entry.and_then(|e| ArchiveEntry::from_tar(e, self.position + 1)),
        };

        match entry {
            Ok(entry) => {
                self.position += 1;
                trace!(position = self.position, path = entry.raw_path(), "archive entry");
                Some(entry)
            }
            Err(err) => {
                self.stop(err);
                None
            }
        }
    }
}

/// One record of a layer tar.
///
/// Reading its content (through [`Read`]) is only meaningful while it is the
/// entry most recently returned by the iterator; advancing skips whatever was
/// left unread.
pub struct ArchiveEntry<'a, R: 'a + Read> {
    raw_path: String,
    kind: EntryKind,
    mode: u32,
    size: u64,
    link_target: Option<String>,
    position: usize,
    inner: Entry<'a, R>,
}

impl<'a, R: Read> ArchiveEntry<'a, R> {
    fn from_tar(inner: Entry<'a, R>, position: usize) -> io::Result<Self> {
        let raw_path = String::from_utf8_lossy(&inner.path_bytes()).into_owned();
        let link_target = inner
            .link_name_bytes()
            .map(|target| String::from_utf8_lossy(&target).into_owned());

        let header = inner.header();
        let mode = header.mode()? & 0o7777;
        let kind = classify(&raw_path, header.entry_type());
        // Honors PAX size overrides
        let size = inner.size();

        Ok(ArchiveEntry {
            raw_path,
            kind,
            mode,
            size,
            link_target,
            position,
            inner,
        })
    }

    /// Path exactly as stored in the archive.
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Path with `./` and trailing `/` removed.
    pub fn path(&self) -> &str {
        paths::normalize(&self.raw_path)
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Permission bits (including setuid, setgid and sticky).
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Target of a symlink or hard link.
    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }

    /// 1-based position of this entry in the archive.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

impl<'a, R: Read> Read for ArchiveEntry<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

fn classify(raw_path: &str, entry_type: EntryType) -> EntryKind {
    if whiteout::is_whiteout(paths::normalize(raw_path)) {
        return EntryKind::Whiteout;
    }

    match entry_type {
        // Pre-POSIX archives mark directories only with a trailing slash
        EntryType::Regular | EntryType::Continuous if raw_path.ends_with('/') => EntryKind::Directory,
        EntryType::Regular | EntryType::Continuous => EntryKind::Regular,
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink => EntryKind::Symlink,
        EntryType::Link => EntryKind::HardLink,
        EntryType::Char => EntryKind::CharDevice,
        EntryType::Block => EntryKind::BlockDevice,
        EntryType::Fifo => EntryKind::Fifo,
        _ => EntryKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TarFixture;

    #[test]
    fn test_entries_in_order() {
        let tar = TarFixture::new()
            .file("./a.txt", b"hello")
            .dir("b/")
            .symlink("b/link", "../a.txt")
            .whiteout(".wh.c.txt")
            .build();

        let mut archive = LayerArchive::new(tar.as_slice());
        let entries = archive.entries().unwrap();
        let seen: Vec<(String, String, EntryKind, u64)> = entries
            .map(|e| (e.raw_path().to_string(), e.path().to_string(), e.kind(), e.size()))
            .collect();

        assert_eq!(
            seen,
            vec![
                ("./a.txt".into(), "a.txt".into(), EntryKind::Regular, 5),
                ("b/".into(), "b".into(), EntryKind::Directory, 0),
                ("b/link".into(), "b/link".into(), EntryKind::Symlink, 0),
                (".wh.c.txt".into(), ".wh.c.txt".into(), EntryKind::Whiteout, 0),
            ]
        );
    }

    #[test]
    fn test_entry_content_and_metadata() {
        let tar = TarFixture::new()
            .file_with_mode("bin/tool", 0o4755, b"\x7fELF\x00\x01")
            .symlink("bin/alias", "tool")
            .build();

        let mut archive = LayerArchive::new(tar.as_slice());
        let mut entries = archive.entries().unwrap();

        let mut tool = entries.next().unwrap();
        assert_eq!(tool.mode(), 0o4755);
        assert_eq!(tool.position(), 1);
        let mut content = Vec::new();
        tool.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"\x7fELF\x00\x01");

        let alias = entries.next().unwrap();
        assert_eq!(alias.kind(), EntryKind::Symlink);
        assert_eq!(alias.link_target(), Some("tool"));
        assert_eq!(alias.position(), 2);

        assert!(entries.next().is_none());
        assert!(entries.interruption().is_none());
    }

    #[test]
    fn test_unread_content_is_skipped() {
        let tar = TarFixture::new()
            .file("big", &[7u8; 3000])
            .file("small", b"ok")
            .build();

        let mut archive = LayerArchive::new(tar.as_slice());
        let mut entries = archive.entries().unwrap();
        let _big = entries.next().unwrap();
        let mut small = entries.next().unwrap();
        let mut content = String::new();
        small.read_to_string(&mut content).unwrap();
        assert_eq!(content, "ok");
    }

    #[test]
    fn test_corrupt_archive_keeps_earlier_entries() {
        let tar = TarFixture::new()
            .file("first.txt", b"12345")
            .file("second.txt", b"67890")
            .corrupt_header(1)
            .build();

        let mut archive = LayerArchive::new(tar.as_slice());
        let mut entries = archive.entries().unwrap();
        let names: Vec<String> = entries.by_ref().map(|e| e.path().to_string()).collect();

        assert_eq!(names, vec!["first.txt"]);
        assert!(entries.interruption().is_some());
        assert_eq!(entries.position(), 1);
        // stays finished
        assert!(entries.next().is_none());
    }

    #[test]
    fn test_size_from_pax_record() {
        let tar = TarFixture::new()
            .pax_sized_file("big.bin", b"hello")
            .file("after", b"x")
            .build();

        let mut archive = LayerArchive::new(tar.as_slice());
        let mut entries = archive.entries().unwrap();

        let mut big = entries.next().unwrap();
        assert_eq!(big.path(), "big.bin");
        assert_eq!(big.size(), 5);
        let mut content = Vec::new();
        big.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"hello");

        assert_eq!(entries.next().unwrap().path(), "after");
        assert!(entries.interruption().is_none());
    }

    #[test]
    fn test_hardlink_entry() {
        let tar = TarFixture::new()
            .file("usr/bin/python3.12", b"ELF")
            .hardlink("usr/bin/python3", "usr/bin/python3.12")
            .build();

        let mut archive = LayerArchive::new(tar.as_slice());
        let link = archive.entries().unwrap().nth(1).unwrap();

        assert_eq!(link.kind(), EntryKind::HardLink);
        assert_eq!(link.link_target(), Some("usr/bin/python3.12"));
        assert_eq!(link.size(), 0);
        assert!(!link.is_dir());
    }

    #[test]
    fn test_classify_legacy_directory() {
        assert_eq!(classify("old/", EntryType::Regular), EntryKind::Directory);
        assert_eq!(classify("dir/.wh.gone", EntryType::Char), EntryKind::Whiteout);
        assert_eq!(classify("dev/null", EntryType::Char), EntryKind::CharDevice);
        assert_eq!(classify("run/pipe", EntryType::Fifo), EntryKind::Fifo);
    }
}
