//! Buffer cache (spec.md §4.6): NBUF fixed 512-byte buffers behind one
//! cache spinlock that protects identity (`dev`/`sector`), `refcount`,
//! `valid`/`dirty`, and LRU list linkage; the 512 bytes of `Data` in each
//! buffer are protected by that buffer's own sleep-lock so a caller can
//! block across the disk round trip without holding a spinlock. The LRU
//! list is index-linked (no pointers) per the arena-of-fixed-records
//! design this kernel uses throughout.

use crate::fs::ide;
use crate::param::NBUF;
use crate::sync::{SleepLock, SleepLockGuard, SpinLock};

pub const SECTOR_SIZE: usize = 512;

const NONE: usize = usize::MAX;

struct Meta {
    dev: u32,
    sector: u32,
    refcount: usize,
    valid: bool,
    dirty: bool,
    prev: usize,
    next: usize,
}

impl Meta {
    const fn unused(idx: usize, prev: usize, next: usize) -> Self {
        Meta {
            dev: 0,
            sector: 0,
            refcount: 0,
            valid: false,
            dirty: false,
            prev,
            next,
        }
    }
}

struct Cache {
    meta: [Meta; NBUF],
    /// Most-recently-used end of the list.
    head: usize,
    /// Least-recently-used end of the list.
    tail: usize,
}

/// Build the initial chain 0 -> 1 -> ... -> NBUF-1, head=0 (MRU), tail
/// last (LRU); every buffer starts equally "least used" so the very
/// first NBUF gets fill the cache in index order.
const fn initial_cache() -> Cache {
    let mut meta = [
        Meta {
            dev: 0,
            sector: 0,
            refcount: 0,
            valid: false,
            dirty: false,
            prev: NONE,
            next: NONE,
        };
        NBUF
    ];
    let mut i = 0;
    while i < NBUF {
        meta[i].prev = if i == 0 { NONE } else { i - 1 };
        meta[i].next = if i + 1 == NBUF { NONE } else { i + 1 };
        i += 1;
    }
    Cache {
        meta,
        head: 0,
        tail: NBUF - 1,
    }
}

impl Clone for Meta {
    fn clone(&self) -> Self {
        Meta {
            dev: self.dev,
            sector: self.sector,
            refcount: self.refcount,
            valid: self.valid,
            dirty: self.dirty,
            prev: self.prev,
            next: self.next,
        }
    }
}
impl Copy for Meta {}

static CACHE: SpinLock<Cache> = SpinLock::new("bcache", initial_cache());

pub struct BufData {
    pub data: [u8; SECTOR_SIZE],
}

macro_rules! buf_lock {
    () => {
        SleepLock::new("buffer", BufData { data: [0; SECTOR_SIZE] })
    };
}

static BUF_DATA: [SleepLock<BufData>; NBUF] = [const { buf_lock!() }; NBUF];

pub struct BufGuard {
    index: usize,
    dev: u32,
    sector: u32,
    guard: SleepLockGuard<'static, BufData>,
}

impl BufGuard {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn dev(&self) -> u32 {
        self.dev
    }

    pub fn sector(&self) -> u32 {
        self.sector
    }
}

impl core::ops::Deref for BufGuard {
    type Target = [u8; SECTOR_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.guard.data
    }
}

impl core::ops::DerefMut for BufGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.data
    }
}

fn unlink(cache: &mut Cache, idx: usize) {
    let (prev, next) = (cache.meta[idx].prev, cache.meta[idx].next);
    if prev != NONE {
        cache.meta[prev].next = next;
    } else {
        cache.head = next;
    }
    if next != NONE {
        cache.meta[next].prev = prev;
    } else {
        cache.tail = prev;
    }
}

fn push_front(cache: &mut Cache, idx: usize) {
    cache.meta[idx].prev = NONE;
    cache.meta[idx].next = cache.head;
    if cache.head != NONE {
        cache.meta[cache.head].prev = idx;
    }
    cache.head = idx;
    if cache.tail == NONE {
        cache.tail = idx;
    }
}

/// Find a cached buffer for (dev, sector), or recycle the least-recently
/// used unreferenced, non-dirty buffer. Panics if every buffer is
/// pinned -- matches the original's fatal "no buffers" condition.
pub fn get(dev: u32, sector: u32) -> BufGuard {
    let mut cache = CACHE.lock();

    let mut scan = cache.head;
    while scan != NONE {
        if cache.meta[scan].dev == dev && cache.meta[scan].sector == sector {
            cache.meta[scan].refcount += 1;
            let index = scan;
            drop(cache);
            let guard = BUF_DATA[index].lock();
            return BufGuard { index, dev, sector, guard };
        }
        scan = cache.meta[scan].next;
    }

    let mut scan = cache.tail;
    while scan != NONE {
        if cache.meta[scan].refcount == 0 && !cache.meta[scan].dirty {
            cache.meta[scan].dev = dev;
            cache.meta[scan].sector = sector;
            cache.meta[scan].valid = false;
            cache.meta[scan].dirty = false;
            cache.meta[scan].refcount = 1;
            let index = scan;
            drop(cache);
            let guard = BUF_DATA[index].lock();
            return BufGuard { index, dev, sector, guard };
        }
        scan = cache.meta[scan].prev;
    }

    panic!("bio: no buffers");
}

/// (dev, sector, dirty) identity of a queued buffer, for the IDE driver
/// to reprogram its registers when starting the next request in line.
pub(crate) fn dev_sector(idx: usize) -> (u32, u32, bool) {
    let cache = CACHE.lock();
    (cache.meta[idx].dev, cache.meta[idx].sector, cache.meta[idx].dirty)
}

pub(crate) fn mark_valid(idx: usize) {
    let mut cache = CACHE.lock();
    cache.meta[idx].valid = true;
    cache.meta[idx].dirty = false;
}

/// Raw pointer to a buffer's 512 data bytes, for the IDE interrupt
/// handler to fill in directly.
///
/// # Safety
/// The caller must be completing the one outstanding disk request for
/// this buffer; the legitimate sleep-lock holder is blocked, not
/// touching `Data`, for the duration of that request.
pub(crate) unsafe fn raw_data_mut(idx: usize) -> &'static mut [u8; SECTOR_SIZE] {
    &mut (*BUF_DATA[idx].data_ptr()).data
}

/// Fetch a buffer for (dev, sector), reading it from disk if not yet
/// cached-valid.
pub fn read(dev: u32, sector: u32) -> BufGuard {
    let buf = get(dev, sector);
    let valid = {
        let cache = CACHE.lock();
        cache.meta[buf.index].valid
    };
    if !valid {
        ide::read_write(buf.index, dev, sector, false);
    }
    buf
}

/// Write a buffer's contents to disk. Caller must hold `buf`'s
/// sleep-lock (guaranteed by the type).
pub fn write(buf: &mut BufGuard) {
    {
        let mut cache = CACHE.lock();
        cache.meta[buf.index].dirty = true;
    }
    ide::read_write(buf.index, buf.dev, buf.sector, true);
}

/// Release a buffer: drop the sleep-lock, then under the cache lock,
/// decrement refcount and move to the MRU end if it is now unreferenced.
pub fn release(buf: BufGuard) {
    let index = buf.index;
    drop(buf);

    let mut cache = CACHE.lock();
    cache.meta[index].refcount -= 1;
    if cache.meta[index].refcount == 0 {
        unlink(&mut cache, index);
        push_front(&mut cache, index);
    }
}
