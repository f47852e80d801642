//! COFF executable parser.
//!
//! Images are little-endian MIPS COFF, fully linked and stripped:
//!
//! ```text
//! 0   file header     20 bytes  magic, section count, a.out size, flags
//! 20  a.out header    28 bytes  entry point at offset 16
//! 48  section headers 40 bytes each
//!     section contents
//! ```

use alloc::string::String;
use alloc::vec::Vec;
use bitflags::bitflags;

use super::{ExecutableImage, LoadError, LoadableSection};
use crate::config::PAGE_SIZE;

/// File header magic for MIPS little-endian images.
pub const COFF_MAGIC: u16 = 0x0162;

const FILE_HEADER_LEN: usize = 20;
const AOUT_HEADER_LEN: usize = 28;
const SECTION_HEADER_LEN: usize = 40;

/// Relocations stripped + executable.
const EXECUTABLE_FLAGS: u16 = 0x0003;

bitflags! {
    /// Section header type flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        const TEXT = 0x0020;
        const DATA = 0x0040;
        const BSS = 0x0080;
        const RDATA = 0x0100;
    }
}

/// Kind of a COFF section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Code, read-only.
    Text,
    /// Initialized data.
    Data,
    /// Zero-filled data, no contents in the file.
    Bss,
    /// Read-only data.
    Rdata,
}

impl SectionKind {
    fn from_flags(flags: u32) -> Option<Self> {
        let flags = SectionFlags::from_bits(flags & 0x0FFF)?;
        [
            SectionKind::Text,
            SectionKind::Data,
            SectionKind::Bss,
            SectionKind::Rdata,
        ]
        .into_iter()
        .find(|kind| kind.flags() == flags)
    }

    fn flags(self) -> SectionFlags {
        match self {
            SectionKind::Text => SectionFlags::TEXT,
            SectionKind::Data => SectionFlags::DATA,
            SectionKind::Bss => SectionFlags::BSS,
            SectionKind::Rdata => SectionFlags::RDATA,
        }
    }

    fn is_read_only(self) -> bool {
        matches!(self, SectionKind::Text | SectionKind::Rdata)
    }

    fn is_initialized(self) -> bool {
        self != SectionKind::Bss
    }
}

/// A section of a parsed image.
#[derive(Debug, Clone)]
pub struct CoffSection {
    name: String,
    kind: SectionKind,
    first_vpn: u32,
    size: u32,
    contents: Vec<u8>,
}

impl CoffSection {
    pub fn kind(&self) -> SectionKind {
        self.kind
    }
}

impl LoadableSection for CoffSection {
    fn name(&self) -> &str {
        &self.name
    }

    fn first_vpn(&self) -> u32 {
        self.first_vpn
    }

    fn page_count(&self) -> u32 {
        self.size.div_ceil(PAGE_SIZE as u32)
    }

    fn is_read_only(&self) -> bool {
        self.kind.is_read_only()
    }

    fn load_page(&self, spn: u32, frame: &mut [u8]) -> Result<(), LoadError> {
        if spn >= self.page_count() || frame.len() != PAGE_SIZE {
            return Err(LoadError::Malformed("section page out of range"));
        }
        frame.fill(0);
        let start = spn as usize * PAGE_SIZE;
        if start < self.contents.len() {
            let end = (start + PAGE_SIZE).min(self.contents.len());
            frame[..end - start].copy_from_slice(&self.contents[start..end]);
        }
        Ok(())
    }
}

/// A parsed COFF executable.
#[derive(Debug, Clone)]
pub struct Coff {
    entry_point: u32,
    sections: Vec<CoffSection>,
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

impl Coff {
    /// Parse an image.
    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        let truncated = LoadError::Malformed("truncated header");

        let magic = read_u16(bytes, 0).ok_or(truncated.clone())?;
        if magic != COFF_MAGIC {
            return Err(LoadError::Malformed("bad magic"));
        }
        let num_sections = read_u16(bytes, 2).ok_or(truncated.clone())? as usize;
        let aout_len = read_u16(bytes, 16).ok_or(truncated.clone())? as usize;
        let flags = read_u16(bytes, 18).ok_or(truncated.clone())?;
        if aout_len != AOUT_HEADER_LEN {
            return Err(LoadError::Malformed("bad a.out header size"));
        }
        if flags & EXECUTABLE_FLAGS != EXECUTABLE_FLAGS {
            return Err(LoadError::Malformed("image is not executable"));
        }
        let entry_point = read_u32(bytes, FILE_HEADER_LEN + 16).ok_or(truncated.clone())?;

        let mut sections = Vec::with_capacity(num_sections);
        for s in 0..num_sections {
            let base = FILE_HEADER_LEN + AOUT_HEADER_LEN + s * SECTION_HEADER_LEN;
            let header = bytes
                .get(base..base + SECTION_HEADER_LEN)
                .ok_or(truncated.clone())?;
            sections.push(Self::parse_section(bytes, header)?);
        }

        log::debug!(
            "[coff] parsed image: entry {:#x}, {} sections",
            entry_point,
            sections.len()
        );
        Ok(Self {
            entry_point,
            sections,
        })
    }

    fn parse_section(bytes: &[u8], header: &[u8]) -> Result<CoffSection, LoadError> {
        let bad = LoadError::Malformed("bad section header");

        let name_bytes = &header[..8];
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(8);
        let name = String::from_utf8(name_bytes[..name_len].to_vec()).map_err(|_| bad.clone())?;

        let vaddr = read_u32(header, 12).ok_or(bad.clone())?;
        let size = read_u32(header, 16).ok_or(bad.clone())?;
        let content_offset = read_u32(header, 20).ok_or(bad.clone())? as usize;
        let relocations = read_u16(header, 32).ok_or(bad.clone())?;
        let flags = read_u32(header, 36).ok_or(bad)?;

        let kind = SectionKind::from_flags(flags)
            .ok_or(LoadError::Malformed("unknown section kind"))?;
        if vaddr as usize % PAGE_SIZE != 0 {
            return Err(LoadError::Malformed("unaligned section"));
        }
        if relocations != 0 {
            return Err(LoadError::Malformed("section has relocations"));
        }

        let contents = if kind.is_initialized() {
            bytes
                .get(content_offset..content_offset + size as usize)
                .ok_or(LoadError::Malformed("section contents past end of image"))?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(CoffSection {
            name,
            kind,
            first_vpn: vaddr / PAGE_SIZE as u32,
            size,
            contents,
        })
    }

    /// Parsed sections.
    pub fn coff_sections(&self) -> &[CoffSection] {
        &self.sections
    }
}

impl ExecutableImage for Coff {
    fn entry_point(&self) -> u32 {
        self.entry_point
    }

    fn sections(&self) -> Vec<&dyn LoadableSection> {
        self.sections
            .iter()
            .map(|s| s as &dyn LoadableSection)
            .collect()
    }
}

struct PendingSection {
    name: String,
    kind: SectionKind,
    vaddr: u32,
    size: u32,
    contents: Vec<u8>,
}

/// Assemble a COFF image.
pub struct ImageBuilder {
    entry_point: u32,
    sections: Vec<PendingSection>,
}

impl ImageBuilder {
    /// Empty image entering at `entry_point`.
    pub fn new(entry_point: u32) -> Self {
        Self {
            entry_point,
            sections: Vec::new(),
        }
    }

    /// Add an initialized section holding `contents` at `vaddr`.
    pub fn section(mut self, name: &str, kind: SectionKind, vaddr: u32, contents: &[u8]) -> Self {
        self.sections.push(PendingSection {
            name: String::from(name),
            kind,
            vaddr,
            size: contents.len() as u32,
            contents: if kind.is_initialized() {
                contents.to_vec()
            } else {
                Vec::new()
            },
        });
        self
    }

    /// Add a zero-filled section of `size` bytes at `vaddr`.
    pub fn bss(mut self, name: &str, vaddr: u32, size: u32) -> Self {
        self.sections.push(PendingSection {
            name: String::from(name),
            kind: SectionKind::Bss,
            vaddr,
            size,
            contents: Vec::new(),
        });
        self
    }

    /// Serialize the image.
    pub fn build(&self) -> Vec<u8> {
        let headers_len = FILE_HEADER_LEN + AOUT_HEADER_LEN + self.sections.len() * SECTION_HEADER_LEN;
        let mut out = Vec::with_capacity(headers_len);

        out.extend_from_slice(&COFF_MAGIC.to_le_bytes());
        out.extend_from_slice(&(self.sections.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0; 12]);
        out.extend_from_slice(&(AOUT_HEADER_LEN as u16).to_le_bytes());
        out.extend_from_slice(&EXECUTABLE_FLAGS.to_le_bytes());

        let mut aout = [0u8; AOUT_HEADER_LEN];
        aout[16..20].copy_from_slice(&self.entry_point.to_le_bytes());
        out.extend_from_slice(&aout);

        let mut content_offset = headers_len;
        for section in &self.sections {
            let mut header = [0u8; SECTION_HEADER_LEN];
            let name = section.name.as_bytes();
            let name_len = name.len().min(8);
            header[..name_len].copy_from_slice(&name[..name_len]);
            header[8..12].copy_from_slice(&section.vaddr.to_le_bytes());
            header[12..16].copy_from_slice(&section.vaddr.to_le_bytes());
            header[16..20].copy_from_slice(&section.size.to_le_bytes());
            header[20..24].copy_from_slice(&(content_offset as u32).to_le_bytes());
            header[36..40].copy_from_slice(&section.kind.flags().bits().to_le_bytes());
            out.extend_from_slice(&header);
            content_offset += section.contents.len();
        }

        for section in &self.sections {
            out.extend_from_slice(&section.contents);
        }
        out
    }
}
