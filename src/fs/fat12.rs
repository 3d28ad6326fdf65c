//! FAT12 filesystem reader (spec.md §4.8): read-only, mounted from the
//! boot sector's BIOS Parameter Block on device 1, with the whole FAT
//! cached in a kernel byte array for fast `next_cluster` lookups.

use crate::error::{KernelError, KernelResult};
use crate::fs::bio;
use crate::param::MAXFATSIZE;
use crate::sync::SpinLock;

const SECTOR_SIZE: usize = 512;
const DEV: u32 = 1;
const DIR_ENTRY_SIZE: usize = 32;
const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DIR_ENTRY_SIZE;
const ATTR_DIRECTORY: u8 = 0x10;

#[derive(Clone, Copy)]
struct Mount {
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    fat_offset: u32,
    fat_size_sectors: u32,
    root_offset: u32,
    root_size_sectors: u32,
    num_root_entries: u32,
    data_offset: u32,
}

struct FatState {
    mount: Option<Mount>,
    fat: [u8; MAXFATSIZE],
}

static STATE: SpinLock<FatState> = SpinLock::new(
    "fat12",
    FatState {
        mount: None,
        fat: [0; MAXFATSIZE],
    },
);

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum EntryTag {
    File,
    Dir,
}

/// A resolved FAT directory entry: enough to drive `read`.
#[derive(Clone, Copy)]
pub struct FatFile {
    pub tag: EntryTag,
    pub first_cluster: u32,
    pub size: u32,
    pub position: u32,
}

/// Read the boot sector, validate it, and cache the FAT. Matches the
/// original's `fsinit`. Called once, from a process context (the first
/// invocation of `forkret`) per spec.md §4.5.
pub fn init() {
    let boot = bio::read(DEV, 0);
    let bytes_per_sector = u16::from_le_bytes([boot[11], boot[12]]) as u32;
    if bytes_per_sector as usize != SECTOR_SIZE {
        panic!("fat12: unsupported sector size");
    }
    let sectors_per_cluster = boot[13] as u32;
    let reserved_sectors = u16::from_le_bytes([boot[14], boot[15]]) as u32;
    let num_fats = boot[16] as u32;
    let num_root_entries = u16::from_le_bytes([boot[17], boot[18]]) as u32;
    let sectors_per_fat = u16::from_le_bytes([boot[22], boot[23]]) as u32;
    bio::release(boot);

    let fat_offset = reserved_sectors;
    let fat_size_sectors = sectors_per_fat;
    let root_offset = fat_offset + num_fats * fat_size_sectors;
    let root_size_sectors = (num_root_entries as usize * DIR_ENTRY_SIZE).div_ceil(SECTOR_SIZE) as u32;
    let data_offset = root_offset + root_size_sectors;

    let mount = Mount {
        bytes_per_sector,
        sectors_per_cluster,
        fat_offset,
        fat_size_sectors,
        root_offset,
        root_size_sectors,
        num_root_entries,
        data_offset,
    };

    let mut state = STATE.lock();
    let fat_bytes = (fat_size_sectors as usize * SECTOR_SIZE).min(MAXFATSIZE);
    for sector_in_fat in 0..(fat_bytes / SECTOR_SIZE) {
        let b = bio::read(DEV, fat_offset + sector_in_fat as u32);
        let dst = &mut state.fat[sector_in_fat * SECTOR_SIZE..(sector_in_fat + 1) * SECTOR_SIZE];
        dst.copy_from_slice(&*b);
        bio::release(b);
    }
    state.mount = Some(mount);
}

fn mount(state: &FatState) -> Mount {
    state.mount.expect("fat12: not mounted")
}

/// Follow one FAT12 link. Returns `None` at a terminus (cluster 0 or
/// >= 0xFF8) to signal end-of-chain, matching spec.md's "return 0 to
/// signal terminus".
fn next_cluster(cluster: u32) -> Option<u32> {
    let state = STATE.lock();
    let offset = (cluster + cluster / 2) as usize;
    let lo = state.fat[offset] as u16;
    let hi = *state.fat.get(offset + 1).unwrap_or(&0) as u16;
    let word = lo | (hi << 8);
    let value = if cluster % 2 == 1 {
        word >> 4
    } else {
        word & 0x0FFF
    };
    if value == 0 || value >= 0xFF8 {
        None
    } else {
        Some(value as u32)
    }
}

fn cluster_size(m: &Mount) -> usize {
    m.sectors_per_cluster as usize * SECTOR_SIZE
}

fn cluster_first_sector(m: &Mount, cluster: u32) -> u32 {
    m.data_offset + (cluster - 2) * m.sectors_per_cluster
}

/// Read up to `size` bytes starting at byte `offset` within cluster
/// `cluster`, sector by sector through the buffer cache.
fn read_cluster(m: &Mount, cluster: u32, buf: &mut [u8], offset: usize, size: usize) {
    let first_sector = cluster_first_sector(m, cluster);
    let mut done = 0;
    let mut pos = offset;
    while done < size {
        let sector = first_sector + (pos / SECTOR_SIZE) as u32;
        let in_sector = pos % SECTOR_SIZE;
        let n = (SECTOR_SIZE - in_sector).min(size - done);
        let b = bio::read(DEV, sector);
        buf[done..done + n].copy_from_slice(&b[in_sector..in_sector + n]);
        bio::release(b);
        done += n;
        pos += n;
    }
}

/// Read from a file/dir's current position into `buf`, returning bytes
/// read and whether EOF/terminus was reached. Matches the original's
/// `fatRead`.
pub fn read(file: &mut FatFile, buf: &mut [u8]) -> usize {
    let state = STATE.lock();
    let m = mount(&state);
    drop(state);

    let csize = cluster_size(&m);
    if csize == 0 {
        return 0;
    }

    let mut cluster = file.first_cluster;
    let mut hops = file.position as usize / csize;
    while hops > 0 {
        match next_cluster(cluster) {
            Some(c) => cluster = c,
            None => return 0,
        }
        hops -= 1;
    }

    let mut total = 0usize;
    while total < buf.len() {
        if file.tag == EntryTag::File && file.position >= file.size {
            break;
        }
        let in_cluster = file.position as usize % csize;
        let remaining_in_cluster = csize - in_cluster;
        let remaining_in_file = if file.tag == EntryTag::File {
            (file.size - file.position) as usize
        } else {
            usize::MAX
        };
        let want = (buf.len() - total).min(remaining_in_cluster).min(remaining_in_file);
        if want == 0 {
            break;
        }
        read_cluster(&m, cluster, &mut buf[total..], in_cluster, want);
        total += want;
        file.position += want as u32;

        if file.position as usize % csize == 0 {
            match next_cluster(cluster) {
                Some(c) => cluster = c,
                None => break,
            }
        }
    }
    total
}

fn to_dos_name(name: &str) -> [u8; 11] {
    let mut out = [b' '; 11];
    if name == "." {
        out[0] = b'.';
        return out;
    }
    if name == ".." {
        out[0] = b'.';
        out[1] = b'.';
        return out;
    }

    let bytes = name.as_bytes();
    let dot = bytes.iter().position(|&b| b == b'.');
    let base_end = dot.unwrap_or(bytes.len()).min(8);
    for (i, &b) in bytes[..base_end].iter().enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    if let Some(dot_pos) = dot {
        let ext = &bytes[dot_pos + 1..];
        for (i, &b) in ext.iter().take(3).enumerate() {
            out[8 + i] = b.to_ascii_uppercase();
        }
    }
    out
}

struct DirEntry {
    name: [u8; 11],
    attr: u8,
    first_cluster: u32,
    size: u32,
}

fn parse_entry(raw: &[u8]) -> DirEntry {
    let mut name = [0u8; 11];
    name.copy_from_slice(&raw[0..11]);
    let attr = raw[11];
    let cluster_hi = u16::from_le_bytes([raw[20], raw[21]]) as u32;
    let cluster_lo = u16::from_le_bytes([raw[26], raw[27]]) as u32;
    let size = u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]);
    DirEntry {
        name,
        attr,
        first_cluster: (cluster_hi << 16) | cluster_lo,
        size,
    }
}

fn find_in_root(target: &[u8; 11]) -> Option<DirEntry> {
    let state = STATE.lock();
    let m = mount(&state);
    drop(state);

    let sectors = (m.num_root_entries as usize).div_ceil(ENTRIES_PER_SECTOR);
    for s in 0..sectors {
        let b = bio::read(DEV, m.root_offset + s as u32);
        for e in 0..ENTRIES_PER_SECTOR {
            let raw = &b[e * DIR_ENTRY_SIZE..(e + 1) * DIR_ENTRY_SIZE];
            if raw[0] == 0 {
                bio::release(b);
                return None;
            }
            if raw[0] == 0xE5 {
                continue;
            }
            if &raw[0..11] == target {
                let entry = parse_entry(raw);
                bio::release(b);
                return Some(entry);
            }
        }
        bio::release(b);
    }
    None
}

fn find_in_subdir(target: &[u8; 11], parent: &DirEntry) -> Option<DirEntry> {
    let mut dir_file = FatFile {
        tag: EntryTag::Dir,
        first_cluster: parent.first_cluster,
        size: u32::MAX,
        position: 0,
    };
    let mut chunk = [0u8; SECTOR_SIZE];
    loop {
        let n = read(&mut dir_file, &mut chunk);
        if n == 0 {
            return None;
        }
        for e in 0..(n / DIR_ENTRY_SIZE) {
            let raw = &chunk[e * DIR_ENTRY_SIZE..(e + 1) * DIR_ENTRY_SIZE];
            if raw[0] == 0 {
                return None;
            }
            if raw[0] == 0xE5 {
                continue;
            }
            if &raw[0..11] == target {
                return Some(parse_entry(raw));
            }
        }
    }
}

/// Resolve `path` (absolute, or relative to `cwd`) to a file or
/// directory. Matches the original's `fs_open`.
pub fn open(cwd: &str, path: &str, want_dir: bool) -> KernelResult<FatFile> {
    let absolute;
    let full_path = if path.starts_with('/') || path.starts_with('\\') {
        path
    } else {
        absolute = alloc_path(cwd, path);
        &absolute
    };

    let components: alloc::vec::Vec<&str> = full_path
        .split(|c| c == '/' || c == '\\')
        .filter(|s| !s.is_empty())
        .collect();

    let mut current: Option<DirEntry> = None;
    for (i, component) in components.iter().enumerate() {
        let dos = to_dos_name(component);
        let found = match &current {
            None => find_in_root(&dos),
            Some(dir) => find_in_subdir(&dos, dir),
        };
        let entry = found.ok_or(KernelError::NotFound)?;

        let is_last = i + 1 == components.len();
        if !is_last && entry.attr & ATTR_DIRECTORY == 0 {
            return Err(KernelError::NotADirectory);
        }
        current = Some(entry);
    }

    let entry = current.ok_or(KernelError::NotFound)?;
    let is_dir = entry.attr & ATTR_DIRECTORY != 0;
    if want_dir != is_dir {
        return Err(KernelError::NotFound);
    }

    Ok(FatFile {
        tag: if is_dir { EntryTag::Dir } else { EntryTag::File },
        first_cluster: entry.first_cluster,
        size: entry.size,
        position: 0,
    })
}

fn alloc_path(cwd: &str, path: &str) -> alloc::string::String {
    if cwd.ends_with('/') {
        [cwd, path].concat()
    } else {
        [cwd, "/", path].concat()
    }
}
