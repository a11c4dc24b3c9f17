//! EBIN container: the position-independent module format the machine
//! loads its components from.
//!
//! On disk: a 60-byte little-endian header, then code, initialised data
//! and relocation sections at the offsets the header declares.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0  | 4 | magic `"EBIN"` |
//! | 4  | 2 | container version |
//! | 6  | 2 | component type (1 CPU, 2 video, 3 audio, 4 I/O, 5 system) |
//! | 8  | 4 | flags |
//! | 12 | 4 | code size |
//! | 16 | 4 | data size |
//! | 20 | 4 | BSS size |
//! | 24 | 4 | code offset |
//! | 28 | 4 | data offset |
//! | 32 | 4 | relocation table offset |
//! | 36 | 4 | relocation count |
//! | 40 | 4 | entry offset (within code) |
//! | 44 | 4 | interface version (major << 16 | minor) |
//! | 48 | 4 | minimum RAM |
//! | 52 | 8 | reserved |
//!
//! Each relocation entry is 8 bytes: offset u32, type u8, section u8,
//! reserved u16.

use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"EBIN";
pub const HEADER_SIZE: usize = 60;
pub const RELOC_ENTRY_SIZE: usize = 8;
/// Highest container version this parser understands.
pub const MAX_VERSION: u16 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EbinError {
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("truncated header: {0} bytes")]
    TruncatedHeader(usize),
    #[error("unsupported container version {0} (max {MAX_VERSION})")]
    UnsupportedVersion(u16),
    #[error("component type {0} out of range")]
    UnknownComponentType(u16),
    #[error("{name} section [{offset:#x}..+{size:#x}] exceeds file of {len:#x} bytes")]
    SectionOutOfBounds {
        name: &'static str,
        offset: u32,
        size: u32,
        len: usize,
    },
    #[error("relocation {index}: unknown type {kind}")]
    UnknownRelocType { index: u32, kind: u8 },
    #[error("relocation {index}: unknown section tag {section}")]
    UnknownRelocSection { index: u32, section: u8 },
    #[error("relocation {index}: offset {offset:#x} outside its {size:#x}-byte section")]
    RelocOutOfBounds { index: u32, offset: u32, size: u32 },
}

/// What kind of module the container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ComponentType {
    Cpu = 1,
    Video = 2,
    Audio = 3,
    Io = 4,
    System = 5,
}

impl ComponentType {
    pub fn from_raw(raw: u16) -> Result<Self, EbinError> {
        match raw {
            1 => Ok(Self::Cpu),
            2 => Ok(Self::Video),
            3 => Ok(Self::Audio),
            4 => Ok(Self::Io),
            5 => Ok(Self::System),
            other => Err(EbinError::UnknownComponentType(other)),
        }
    }
}

/// How a relocation patches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelocType {
    /// Add the load base to the 32-bit word at the offset.
    Absolute = 0,
    /// Position independent already; nothing to patch.
    Relative = 1,
    /// Add the upper half of the load base to the 16-bit word.
    High16 = 2,
    /// Add the lower half of the load base to the 16-bit word.
    Low16 = 3,
}

impl RelocType {
    /// Bytes the patch touches at the target offset.
    #[must_use]
    pub fn patch_size(self) -> u32 {
        match self {
            Self::Absolute | Self::Relative => 4,
            Self::High16 | Self::Low16 => 2,
        }
    }
}

/// Which section a relocation points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocSection {
    Code,
    Data,
}

/// One relocation table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocEntry {
    pub offset: u32,
    pub kind: RelocType,
    pub section: RelocSection,
}

/// Parsed header, host-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub component: ComponentType,
    pub flags: u32,
    pub code_size: u32,
    pub data_size: u32,
    pub bss_size: u32,
    pub code_offset: u32,
    pub data_offset: u32,
    pub reloc_offset: u32,
    pub reloc_count: u32,
    pub entry_offset: u32,
    /// Interface version, major in the top half.
    pub interface_version: u32,
    pub min_ram: u32,
}

impl Header {
    #[must_use]
    pub fn interface_major(&self) -> u16 {
        (self.interface_version >> 16) as u16
    }

    #[must_use]
    pub fn interface_minor(&self) -> u16 {
        self.interface_version as u16
    }

    /// Total image bytes the loader must reserve, before alignment.
    #[must_use]
    pub fn image_size(&self) -> u64 {
        u64::from(self.code_size) + u64::from(self.data_size) + u64::from(self.bss_size)
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn check_section(
    name: &'static str,
    offset: u32,
    size: u32,
    len: usize,
) -> Result<(), EbinError> {
    let end = u64::from(offset) + u64::from(size);
    if end > len as u64 {
        return Err(EbinError::SectionOutOfBounds {
            name,
            offset,
            size,
            len,
        });
    }
    Ok(())
}

/// A fully parsed container.
#[derive(Debug, Clone, PartialEq)]
pub struct EbinFile {
    pub header: Header,
    code: Vec<u8>,
    data: Vec<u8>,
    relocs: Vec<RelocEntry>,
}

impl EbinFile {
    /// Parse and validate a container image.
    ///
    /// Every size, offset and relocation is checked here; a container
    /// that parses can be loaded without further bounds checks.
    pub fn parse(bytes: &[u8]) -> Result<Self, EbinError> {
        if bytes.len() < HEADER_SIZE {
            return Err(EbinError::TruncatedHeader(bytes.len()));
        }
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(EbinError::BadMagic(magic));
        }
        let version = read_u16(bytes, 4);
        if version > MAX_VERSION {
            return Err(EbinError::UnsupportedVersion(version));
        }
        let component = ComponentType::from_raw(read_u16(bytes, 6))?;
        let header = Header {
            version,
            component,
            flags: read_u32(bytes, 8),
            code_size: read_u32(bytes, 12),
            data_size: read_u32(bytes, 16),
            bss_size: read_u32(bytes, 20),
            code_offset: read_u32(bytes, 24),
            data_offset: read_u32(bytes, 28),
            reloc_offset: read_u32(bytes, 32),
            reloc_count: read_u32(bytes, 36),
            entry_offset: read_u32(bytes, 40),
            interface_version: read_u32(bytes, 44),
            min_ram: read_u32(bytes, 48),
        };

        check_section("code", header.code_offset, header.code_size, bytes.len())?;
        check_section("data", header.data_offset, header.data_size, bytes.len())?;
        let reloc_bytes = header
            .reloc_count
            .saturating_mul(RELOC_ENTRY_SIZE as u32);
        check_section("reloc", header.reloc_offset, reloc_bytes, bytes.len())?;
        check_section("entry", header.entry_offset, 0, header.code_size as usize)?;

        let code_at = header.code_offset as usize;
        let data_at = header.data_offset as usize;
        let code = bytes[code_at..code_at + header.code_size as usize].to_vec();
        let data = bytes[data_at..data_at + header.data_size as usize].to_vec();

        let mut relocs = Vec::with_capacity(header.reloc_count as usize);
        for index in 0..header.reloc_count {
            let at = header.reloc_offset as usize + (index as usize) * RELOC_ENTRY_SIZE;
            let offset = read_u32(bytes, at);
            let kind_raw = bytes[at + 4];
            let section_raw = bytes[at + 5];
            let kind = match kind_raw {
                0 => RelocType::Absolute,
                1 => RelocType::Relative,
                2 => RelocType::High16,
                3 => RelocType::Low16,
                other => return Err(EbinError::UnknownRelocType { index, kind: other }),
            };
            let (section, section_size) = match section_raw {
                0 => (RelocSection::Code, header.code_size),
                1 => (RelocSection::Data, header.data_size),
                other => {
                    return Err(EbinError::UnknownRelocSection {
                        index,
                        section: other,
                    });
                }
            };
            if u64::from(offset) + u64::from(kind.patch_size()) > u64::from(section_size) {
                return Err(EbinError::RelocOutOfBounds {
                    index,
                    offset,
                    size: section_size,
                });
            }
            relocs.push(RelocEntry {
                offset,
                kind,
                section,
            });
        }

        Ok(Self {
            header,
            code,
            data,
            relocs,
        })
    }

    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn relocs(&self) -> &[RelocEntry] {
        &self.relocs
    }
}

/// Assembles containers for the packer and the test suites.
#[derive(Debug, Clone)]
pub struct EbinBuilder {
    component: ComponentType,
    code: Vec<u8>,
    data: Vec<u8>,
    bss_size: u32,
    relocs: Vec<RelocEntry>,
    entry_offset: u32,
    interface_version: u32,
    min_ram: u32,
    version: u16,
}

impl EbinBuilder {
    #[must_use]
    pub fn new(component: ComponentType) -> Self {
        Self {
            component,
            code: Vec::new(),
            data: Vec::new(),
            bss_size: 0,
            relocs: Vec::new(),
            entry_offset: 0,
            interface_version: 1 << 16,
            min_ram: 0,
            version: MAX_VERSION,
        }
    }

    #[must_use]
    pub fn code(mut self, code: &[u8]) -> Self {
        self.code = code.to_vec();
        self
    }

    #[must_use]
    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    #[must_use]
    pub fn bss(mut self, size: u32) -> Self {
        self.bss_size = size;
        self
    }

    #[must_use]
    pub fn entry(mut self, offset: u32) -> Self {
        self.entry_offset = offset;
        self
    }

    #[must_use]
    pub fn interface_version(mut self, major: u16, minor: u16) -> Self {
        self.interface_version = u32::from(major) << 16 | u32::from(minor);
        self
    }

    #[must_use]
    pub fn min_ram(mut self, bytes: u32) -> Self {
        self.min_ram = bytes;
        self
    }

    /// Container version override, for negative tests.
    #[must_use]
    pub fn container_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn reloc(mut self, offset: u32, kind: RelocType, section: RelocSection) -> Self {
        self.relocs.push(RelocEntry {
            offset,
            kind,
            section,
        });
        self
    }

    /// Serialise: header, code, data, relocation table.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let code_offset = HEADER_SIZE as u32;
        let data_offset = code_offset + self.code.len() as u32;
        let reloc_offset = data_offset + self.data.len() as u32;

        let mut out = Vec::with_capacity(
            HEADER_SIZE + self.code.len() + self.data.len() + self.relocs.len() * RELOC_ENTRY_SIZE,
        );
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.component as u16).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // flags
        out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.bss_size.to_le_bytes());
        out.extend_from_slice(&code_offset.to_le_bytes());
        out.extend_from_slice(&data_offset.to_le_bytes());
        out.extend_from_slice(&reloc_offset.to_le_bytes());
        out.extend_from_slice(&(self.relocs.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.entry_offset.to_le_bytes());
        out.extend_from_slice(&self.interface_version.to_le_bytes());
        out.extend_from_slice(&self.min_ram.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        debug_assert_eq!(out.len(), HEADER_SIZE);

        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.data);
        for reloc in &self.relocs {
            out.extend_from_slice(&reloc.offset.to_le_bytes());
            out.push(reloc.kind as u8);
            out.push(match reloc.section {
                RelocSection::Code => 0,
                RelocSection::Data => 1,
            });
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_60_bytes() {
        let image = EbinBuilder::new(ComponentType::Cpu).build();
        assert_eq!(image.len(), HEADER_SIZE);
    }

    #[test]
    fn build_parse_round_trip() {
        let image = EbinBuilder::new(ComponentType::Io)
            .code(&[0x90, 0x90, 0x90, 0xC3])
            .data(&[1, 2, 3, 4, 5, 6, 7, 8])
            .bss(32)
            .entry(2)
            .interface_version(1, 3)
            .min_ram(0x1000)
            .reloc(0, RelocType::Absolute, RelocSection::Code)
            .reloc(4, RelocType::Low16, RelocSection::Data)
            .build();

        let parsed = EbinFile::parse(&image).expect("valid container");
        assert_eq!(parsed.header.component, ComponentType::Io);
        assert_eq!(parsed.header.code_size, 4);
        assert_eq!(parsed.header.data_size, 8);
        assert_eq!(parsed.header.bss_size, 32);
        assert_eq!(parsed.header.entry_offset, 2);
        assert_eq!(parsed.header.interface_major(), 1);
        assert_eq!(parsed.header.interface_minor(), 3);
        assert_eq!(parsed.header.min_ram, 0x1000);
        assert_eq!(parsed.code(), &[0x90, 0x90, 0x90, 0xC3]);
        assert_eq!(parsed.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(parsed.relocs().len(), 2);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut image = EbinBuilder::new(ComponentType::Cpu).build();
        image[0] = b'X';
        assert!(matches!(
            EbinFile::parse(&image),
            Err(EbinError::BadMagic(_))
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        assert_eq!(
            EbinFile::parse(&[0x45; 10]),
            Err(EbinError::TruncatedHeader(10))
        );
    }

    #[test]
    fn rejects_future_container_version() {
        let image = EbinBuilder::new(ComponentType::Cpu)
            .container_version(MAX_VERSION + 1)
            .build();
        assert_eq!(
            EbinFile::parse(&image),
            Err(EbinError::UnsupportedVersion(MAX_VERSION + 1))
        );
    }

    #[test]
    fn rejects_type_out_of_range() {
        let mut image = EbinBuilder::new(ComponentType::Cpu).build();
        image[6] = 9;
        assert_eq!(
            EbinFile::parse(&image),
            Err(EbinError::UnknownComponentType(9))
        );
    }

    #[test]
    fn rejects_truncated_code_section() {
        let mut image = EbinBuilder::new(ComponentType::Cpu)
            .code(&[0; 16])
            .build();
        image.truncate(HEADER_SIZE + 8);
        assert!(matches!(
            EbinFile::parse(&image),
            Err(EbinError::SectionOutOfBounds { name: "code", .. })
        ));
    }

    #[test]
    fn rejects_reloc_offset_beyond_section() {
        let image = EbinBuilder::new(ComponentType::Cpu)
            .code(&[0; 8])
            .reloc(8, RelocType::Absolute, RelocSection::Code)
            .build();
        assert!(matches!(
            EbinFile::parse(&image),
            Err(EbinError::RelocOutOfBounds { index: 0, .. })
        ));
    }

    #[test]
    fn reloc_patch_window_counts() {
        // A 2-byte patch at size-2 fits; a 4-byte patch there does not
        let ok = EbinBuilder::new(ComponentType::Cpu)
            .code(&[0; 8])
            .reloc(6, RelocType::High16, RelocSection::Code)
            .build();
        assert!(EbinFile::parse(&ok).is_ok());
        let bad = EbinBuilder::new(ComponentType::Cpu)
            .code(&[0; 8])
            .reloc(6, RelocType::Absolute, RelocSection::Code)
            .build();
        assert!(EbinFile::parse(&bad).is_err());
    }
}
