//! The free-segment bitset and per-segment write locks.
//!
//! `used` tracks which segments are occupied; `locks` holds one write-only
//! lock per segment (readers inherit the index-slot lock instead, per the
//! concurrency model — see §5 of the design notes). Both grow together
//! whenever the file is extended to host a new allocation.

use std::sync::Arc;

use parking_lot::{ArcRwLockWriteGuard, RawRwLock, RwLock};

use crate::error::RegionResult;

pub struct SegmentTable {
    used: RwLock<Vec<bool>>,
    locks: RwLock<Vec<Arc<RwLock<()>>>>,
}

fn find_contiguous_free(used: &[bool], need: usize) -> Option<usize> {
    if need == 0 {
        return Some(1);
    }
    let mut run = 0usize;
    for (i, occupied) in used.iter().enumerate() {
        if *occupied {
            run = 0;
            continue;
        }
        run += 1;
        if run == need {
            return Some(i + 2 - need);
        }
    }
    None
}

fn mark(used: &mut [bool], start: usize, need: usize, value: bool) {
    for slot in used.iter_mut().skip(start - 1).take(need) {
        *slot = value;
    }
}

impl SegmentTable {
    pub fn new(initial_len: usize) -> Self {
        Self {
            used: RwLock::new(vec![false; initial_len]),
            locks: RwLock::new((0..initial_len).map(|_| Arc::new(RwLock::new(()))).collect()),
        }
    }

    /// Mark a range used at reconstruction time (§4.4 step 6); not
    /// contention-checked, since only `open` calls this before the region
    /// is shared with any other thread.
    pub fn mark_initial(&self, start: u32, need: usize) {
        let mut used = self.used.write();
        mark(&mut used, start as usize, need, true);
    }

    /// Find a free contiguous run of `need` segments, growing the table
    /// (via `grow_file`, which must extend the backing file to cover
    /// `new_segment_count` segments) if none exists, then take write locks
    /// across the whole range. Retries from scratch if a lock in the range
    /// is already held — which given atomic marking should never actually
    /// happen, but the spec's described protocol allows for it.
    pub fn allocate<F>(
        &self,
        need: usize,
        mut grow_file: F,
    ) -> RegionResult<(u32, Vec<ArcRwLockWriteGuard<RawRwLock, ()>>)>
    where
        F: FnMut(usize) -> RegionResult<()>,
    {
        loop {
            let start = {
                let mut used = self.used.write();
                match find_contiguous_free(&used, need) {
                    Some(s) => {
                        mark(&mut used, s, need, true);
                        s
                    }
                    None => {
                        let old_len = used.len();
                        let new_len = old_len.max(64) + need;
                        grow_file(new_len)?;
                        used.resize(new_len, false);
                        let mut locks = self.locks.write();
                        locks.resize_with(new_len, || Arc::new(RwLock::new(())));
                        drop(locks);
                        let s = find_contiguous_free(&used, need)
                            .expect("table was just grown to fit `need` free segments");
                        mark(&mut used, s, need, true);
                        s
                    }
                }
            };

            {
                let mut locks = self.locks.write();
                let needed_len = start - 1 + need;
                if locks.len() < needed_len {
                    locks.resize_with(needed_len, || Arc::new(RwLock::new(())));
                }
            }

            let arcs: Vec<Arc<RwLock<()>>> = {
                let locks = self.locks.read();
                locks[start - 1..start - 1 + need].to_vec()
            };

            let mut guards = Vec::with_capacity(need);
            let mut ok = true;
            for arc in &arcs {
                match arc.try_write_arc() {
                    Some(guard) => guards.push(guard),
                    None => {
                        ok = false;
                        break;
                    }
                }
            }

            if ok {
                return Ok((start as u32, guards));
            }

            drop(guards);
            let mut used = self.used.write();
            mark(&mut used, start, need, false);
        }
    }

    pub fn free(&self, start: u32, need: usize) {
        let mut used = self.used.write();
        mark(&mut used, start as usize, need, false);
    }

    #[cfg(test)]
    pub fn is_used(&self, segment: u32) -> bool {
        self.used.read()[segment as usize - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_run_first() {
        let table = SegmentTable::new(0);
        let (s1, _g1) = table.allocate(2, |n| {
            assert!(n >= 2);
            Ok(())
        }).unwrap();
        assert_eq!(s1, 1);
        let (s2, _g2) = table.allocate(3, |n| {
            assert!(n >= 5);
            Ok(())
        }).unwrap();
        assert_eq!(s2, 3);
    }

    #[test]
    fn freeing_reopens_the_range_for_reuse() {
        let table = SegmentTable::new(0);
        let (s1, g1) = table.allocate(4, |_| Ok(())).unwrap();
        drop(g1);
        table.free(s1, 4);
        assert!(!table.is_used(s1));
        let (s2, _g2) = table.allocate(4, |_| Ok(())).unwrap();
        assert_eq!(s2, s1);
    }

    #[test]
    fn mark_initial_reserves_reconstructed_ranges() {
        let table = SegmentTable::new(8);
        table.mark_initial(2, 3);
        assert!(table.is_used(2));
        assert!(table.is_used(4));
        assert!(!table.is_used(1));
        assert!(!table.is_used(5));
    }
}
