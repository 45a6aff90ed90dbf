use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

pub const MAGIC_BIG_ENDIAN: [u8; 4] = [0xFA, 0x57, 0xC0, 0xDE];
pub const MAGIC_LITTLE_ENDIAN: [u8; 4] = [0xDE, 0xC0, 0x57, 0xFA];

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("unrecognized format marker {magic:02x?} in {}", .path.display())]
    UnknownMagic { path: PathBuf, magic: [u8; 4] },
    #[error("header of {} is truncated at byte {offset}", .path.display())]
    Truncated { path: PathBuf, offset: usize },
    #[error("failed to read header of {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Byte range of a length-prefixed string inside the artifact file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringSpan {
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub byte_order: ByteOrder,
    pub major_version: u8,
    pub minor_version: u8,
    pub game_id: u16,
    pub compilation_time: u64,
    pub source_file_name: String,
    pub user_name: String,
    pub machine_name: String,
    pub user_name_span: StringSpan,
    pub machine_name_span: StringSpan,
}

impl ArtifactHeader {
    pub fn compiled_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.compilation_time)
    }
}

/// Reads the embedded header of a compiled artifact.
pub trait HeaderReader: Send + Sync {
    fn read_header(&self, path: &Path) -> Result<ArtifactHeader, HeaderError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryHeaderReader;

impl HeaderReader for BinaryHeaderReader {
    fn read_header(&self, path: &Path) -> Result<ArtifactHeader, HeaderError> {
        let bytes = fs::read(path).map_err(|source| HeaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_header(path, &bytes)
    }
}

pub fn parse_header(path: &Path, bytes: &[u8]) -> Result<ArtifactHeader, HeaderError> {
    let mut cursor = Cursor {
        path,
        bytes,
        offset: 0,
        order: ByteOrder::Big,
    };

    let magic: [u8; 4] = cursor.take(4)?.try_into().unwrap_or_default();
    cursor.order = match magic {
        MAGIC_BIG_ENDIAN => ByteOrder::Big,
        MAGIC_LITTLE_ENDIAN => ByteOrder::Little,
        other => {
            return Err(HeaderError::UnknownMagic {
                path: path.to_path_buf(),
                magic: other,
            });
        }
    };

    let major_version = cursor.take(1)?[0];
    let minor_version = cursor.take(1)?[0];
    let game_id = cursor.read_u16()?;
    let compilation_time = cursor.read_u64()?;
    let (source_file_name, _) = cursor.read_string()?;
    let (user_name, user_name_span) = cursor.read_string()?;
    let (machine_name, machine_name_span) = cursor.read_string()?;

    Ok(ArtifactHeader {
        byte_order: cursor.order,
        major_version,
        minor_version,
        game_id,
        compilation_time,
        source_file_name,
        user_name,
        machine_name,
        user_name_span,
        machine_name_span,
    })
}

struct Cursor<'a> {
    path: &'a Path,
    bytes: &'a [u8],
    offset: usize,
    order: ByteOrder,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], HeaderError> {
        let end = self.offset + len;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| HeaderError::Truncated {
                path: self.path.to_path_buf(),
                offset: self.offset,
            })?;
        self.offset = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, HeaderError> {
        let raw: [u8; 2] = self.take(2)?.try_into().unwrap_or_default();
        Ok(match self.order {
            ByteOrder::Big => u16::from_be_bytes(raw),
            ByteOrder::Little => u16::from_le_bytes(raw),
        })
    }

    fn read_u64(&mut self) -> Result<u64, HeaderError> {
        let raw: [u8; 8] = self.take(8)?.try_into().unwrap_or_default();
        Ok(match self.order {
            ByteOrder::Big => u64::from_be_bytes(raw),
            ByteOrder::Little => u64::from_le_bytes(raw),
        })
    }

    fn read_string(&mut self) -> Result<(String, StringSpan), HeaderError> {
        let len = usize::from(self.read_u16()?);
        let offset = self.offset;
        let raw = self.take(len)?;
        Ok((
            String::from_utf8_lossy(raw).into_owned(),
            StringSpan { offset, len },
        ))
    }
}

/// Encodes a header in the layout [`parse_header`] understands.
pub fn encode_header(header: &ArtifactHeader) -> Vec<u8> {
    let order = header.byte_order;
    let mut out = Vec::new();
    out.extend_from_slice(match order {
        ByteOrder::Big => &MAGIC_BIG_ENDIAN,
        ByteOrder::Little => &MAGIC_LITTLE_ENDIAN,
    });
    out.push(header.major_version);
    out.push(header.minor_version);
    push_u16(&mut out, order, header.game_id);
    match order {
        ByteOrder::Big => out.extend_from_slice(&header.compilation_time.to_be_bytes()),
        ByteOrder::Little => out.extend_from_slice(&header.compilation_time.to_le_bytes()),
    }
    for value in [
        &header.source_file_name,
        &header.user_name,
        &header.machine_name,
    ] {
        let len = u16::try_from(value.len()).unwrap_or(u16::MAX);
        push_u16(&mut out, order, len);
        out.extend_from_slice(&value.as_bytes()[..usize::from(len)]);
    }
    out
}

fn push_u16(out: &mut Vec<u8>, order: ByteOrder, value: u16) {
    match order {
        ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
    }
}
