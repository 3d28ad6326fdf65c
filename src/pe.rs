//! PE/COFF executable parsing (spec.md §4.11, §6): just enough of the
//! format to validate the signature, find the entry point, and walk
//! section headers -- this kernel loads native PE binaries built for it,
//! not general Windows PE files.

use crate::error::{KernelError, KernelResult};
use crate::fs::fat12::{self, FatFile};

/// Offset of the `"PE\0\0"` signature past the DOS stub.
pub const PE_SIGNATURE_OFFSET: usize = 0x80;
const FILE_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;

pub struct FileHeader {
    pub number_of_sections: u16,
    pub size_of_optional_header: u16,
}

pub struct OptionalHeader {
    pub address_of_entry_point: u32,
}

pub struct SectionHeader {
    pub virtual_address: u32,
    pub actual_size: u32,
    pub offset_in_exe_file: u32,
}

fn read_at(file: &mut FatFile, offset: u32, buf: &mut [u8]) -> KernelResult<()> {
    file.position = offset;
    let n = fat12::read(file, buf);
    if n != buf.len() {
        return Err(KernelError::WrongFormat);
    }
    Ok(())
}

/// Validate the `"PE\0\0"` signature and read the file + optional
/// headers. Returns the file offset immediately past the optional
/// header, where section headers begin.
pub fn read_headers(file: &mut FatFile) -> KernelResult<(FileHeader, OptionalHeader, u32)> {
    let mut sig = [0u8; 4];
    read_at(file, PE_SIGNATURE_OFFSET as u32, &mut sig)?;
    if &sig != b"PE\0\0" {
        return Err(KernelError::WrongFormat);
    }

    let mut fh = [0u8; FILE_HEADER_SIZE];
    read_at(file, (PE_SIGNATURE_OFFSET + 4) as u32, &mut fh)?;
    let number_of_sections = u16::from_le_bytes([fh[2], fh[3]]);
    let size_of_optional_header = u16::from_le_bytes([fh[16], fh[17]]);

    let optional_offset = (PE_SIGNATURE_OFFSET + 4 + FILE_HEADER_SIZE) as u32;
    let mut opt_entry = [0u8; 4];
    read_at(file, optional_offset + 16, &mut opt_entry)?;
    let address_of_entry_point = u32::from_le_bytes(opt_entry);

    let sections_offset = optional_offset + size_of_optional_header as u32;

    Ok((
        FileHeader {
            number_of_sections,
            size_of_optional_header,
        },
        OptionalHeader { address_of_entry_point },
        sections_offset,
    ))
}

pub fn read_section_header(file: &mut FatFile, offset: u32) -> KernelResult<SectionHeader> {
    let mut raw = [0u8; SECTION_HEADER_SIZE];
    read_at(file, offset, &mut raw)?;
    Ok(SectionHeader {
        actual_size: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
        virtual_address: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        offset_in_exe_file: u32::from_le_bytes([raw[20], raw[21], raw[22], raw[23]]),
    })
}

pub const fn section_header_size() -> u32 {
    SECTION_HEADER_SIZE as u32
}
