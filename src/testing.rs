//! Fixtures shared by unit tests

use std::io::Read;

use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};

use crate::image::{BlobSource, HistoryRecord, Image, LayerHandle};

/// Builds layer tars entry by entry, writing names verbatim so that
/// `./` prefixes and trailing slashes survive.
pub struct TarFixture {
    builder: Builder<Vec<u8>>,
    offset: usize,
    header_offsets: Vec<usize>,
    corrupt: Vec<usize>,
}

impl TarFixture {
    pub fn new() -> Self {
        TarFixture {
            builder: Builder::new(Vec::new()),
            offset: 0,
            header_offsets: Vec::new(),
            corrupt: Vec::new(),
        }
    }

    pub fn file(self, path: &str, data: &[u8]) -> Self {
        self.file_with_mode(path, 0o644, data)
    }

    pub fn file_with_mode(self, path: &str, mode: u32, data: &[u8]) -> Self {
        self.append(path, EntryType::Regular, mode, None, data)
    }

    pub fn dir(self, path: &str) -> Self {
        self.append(path, EntryType::Directory, 0o755, None, &[])
    }

    pub fn symlink(self, path: &str, target: &str) -> Self {
        self.append(path, EntryType::Symlink, 0o777, Some(target), &[])
    }

    pub fn hardlink(self, path: &str, target: &str) -> Self {
        self.append(path, EntryType::Link, 0o644, Some(target), &[])
    }

    pub fn whiteout(self, path: &str) -> Self {
        self.append(path, EntryType::Regular, 0o644, None, &[])
    }

    /// Regular file whose header size field is zero; the real size is only
    /// carried by a preceding PAX `size` record.
    pub fn pax_sized_file(self, path: &str, data: &[u8]) -> Self {
        let value = format!(" size={}\n", data.len());
        // The record length includes its own digits
        let mut len = value.len() + 1;
        while len.to_string().len() + value.len() != len {
            len += 1;
        }
        let record = format!("{len}{value}");

        self.append("PaxHeaders/entry", EntryType::XHeader, 0o644, None, record.as_bytes())
            .append_sized(path, EntryType::Regular, 0o644, None, data, 0)
    }

    /// Break the checksum of the header of entry `index` (0-based).
    pub fn corrupt_header(mut self, index: usize) -> Self {
        self.corrupt.push(index);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut bytes = self.builder.into_inner().expect("finish tar");
        for index in self.corrupt {
            bytes[self.header_offsets[index]] ^= 0x20;
        }
        bytes
    }

    fn append(self, path: &str, entry_type: EntryType, mode: u32, link: Option<&str>, data: &[u8]) -> Self {
        self.append_sized(path, entry_type, mode, link, data, data.len() as u64)
    }

    fn append_sized(
        mut self,
        path: &str,
        entry_type: EntryType,
        mode: u32,
        link: Option<&str>,
        data: &[u8],
        header_size: u64,
    ) -> Self {
        let name = path.as_bytes();
        assert!(name.len() < 100, "fixture paths must fit the old header");

        let mut header = Header::new_gnu();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_size(header_size);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        if let Some(target) = link {
            header.set_link_name(target).expect("link name");
        }
        header.set_cksum();

        self.header_offsets.push(self.offset);
        self.offset += 512 + data.len().div_ceil(512) * 512;
        self.builder.append(&header, data).expect("append entry");
        self
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Layer blob held in memory.
#[derive(Debug)]
pub struct MemoryBlob(pub Vec<u8>);

impl BlobSource for MemoryBlob {
    fn open(&self) -> crate::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.0.as_slice()))
    }
}

/// Blob whose every open fails.
#[derive(Debug)]
pub struct BrokenBlob;

impl BlobSource for BrokenBlob {
    fn open(&self) -> crate::Result<Box<dyn Read + '_>> {
        Err(crate::Error::FetchFailed {
            reference: "broken".into(),
            reason: "connection reset".into(),
        })
    }
}

pub fn layer(digest: &str, tar: Vec<u8>) -> LayerHandle {
    let size = tar.len() as u64;
    LayerHandle::new(digest, size, Box::new(MemoryBlob(tar)))
}

pub fn image(layers: Vec<LayerHandle>, history: Vec<HistoryRecord>) -> Image {
    Image::new("test/image:latest", layers, history)
}

pub fn step(created_by: &str, empty_layer: bool) -> HistoryRecord {
    HistoryRecord {
        created_by: created_by.to_string(),
        empty_layer,
        ..Default::default()
    }
}
