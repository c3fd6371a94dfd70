//! The Pool façade: lifecycle, allocation, and free-with-coalescing.

use crate::cluster::{ClusterHeader, cluster_contains, header_of_node};
use crate::error::{PoolError, PoolResult};
use crate::list::{ListHead, ListNode};
use crate::slot::{
    self, MIN_SLOT_SIZE, back_ptr_of, is_first_slot, node_ptr, run_len_of, slot_of_node,
};
use core::alloc::Layout;
use core::mem::size_of;
use core::ptr;
use slopos_lib::{align_up_usize, klog_debug};

/// Number of bucket free-lists, indexed by `floor(log2(run_len))`, with the
/// last bucket catching every run length `>= 2^(NUM_BUCKETS - 1)`.
pub const NUM_BUCKETS: usize = 8;

fn bucket_index(len: u32) -> usize {
    debug_assert!(len >= 1);
    let bits = 31 - len.leading_zeros();
    (bits as usize).min(NUM_BUCKETS - 1)
}

/// True if `target` currently lies inside a tracked free run, i.e. a
/// `free` of that slot would be a double-free. Walks from the cluster's
/// first slot using the same run-skipping scheme as `finalize_cluster`,
/// stopping as soon as `target` is reached or skipped over. Only called
/// from the `debug_assert!` in `free_index`.
fn slot_is_free(header: &ClusterHeader, target: u32) -> bool {
    let mut i = 0u32;
    while i <= target {
        if unsafe { crate::bitmap::bit_is_set(header.bitmap, i) } {
            let candidate = unsafe { header.slot_ptr(i) };
            if unsafe { is_first_slot(candidate) } {
                let len = unsafe { run_len_of(candidate) } as u32;
                if target < i + len {
                    return true;
                }
                i += len;
                continue;
            }
        }
        i += 1;
    }
    false
}

pub type AcquireHook = fn(usize) -> Option<*mut u8>;
pub type ReleaseHook = fn(*mut u8, usize);
pub type Finalizer = fn(*mut u8);

fn default_acquire(size: usize) -> Option<*mut u8> {
    let layout = Layout::from_size_align(size, size_of::<usize>()).ok()?;
    let ptr = unsafe { alloc::alloc::alloc(layout) };
    if ptr.is_null() { None } else { Some(ptr) }
}

fn default_release(ptr: *mut u8, size: usize) {
    let layout = Layout::from_size_align(size, size_of::<usize>())
        .expect("cluster layout was valid at acquire time");
    unsafe { alloc::alloc::dealloc(ptr, layout) };
}

/// A fixed-element-size memory pool.
///
/// Must be constructed with [`Pool::uninit`] and then [`init`](Pool::init)ed
/// in place — a by-value constructor would let a caller move the `Pool`
/// after its bucket sentinels have self-linked, which is unsound. Not
/// thread-safe: wrap in a caller-supplied lock for concurrent access.
pub struct Pool {
    elem_size: usize,
    slots_per_cluster: u32,
    cluster_size: usize,
    bitmap_off: usize,
    slots_off: usize,
    clusters: ListHead,
    buckets: [ListHead; NUM_BUCKETS],
    linger: *mut ClusterHeader,
    free_count: usize,
    clusters_allocated: usize,
    finalizer: Option<Finalizer>,
    acquire: AcquireHook,
    release: ReleaseHook,
    initialized: bool,
}

impl Pool {
    pub const fn uninit() -> Self {
        Self {
            elem_size: 0,
            slots_per_cluster: 0,
            cluster_size: 0,
            bitmap_off: 0,
            slots_off: 0,
            clusters: ListHead::new(),
            buckets: [
                ListHead::new(),
                ListHead::new(),
                ListHead::new(),
                ListHead::new(),
                ListHead::new(),
                ListHead::new(),
                ListHead::new(),
                ListHead::new(),
            ],
            linger: ptr::null_mut(),
            free_count: 0,
            clusters_allocated: 0,
            finalizer: None,
            acquire: default_acquire,
            release: default_release,
            initialized: false,
        }
    }

    /// Initialises the pool using the default (global-allocator-backed)
    /// acquire/release hooks.
    pub fn init(&mut self, elem_size: usize, slots_per_cluster: u32, finalizer: Option<Finalizer>) {
        self.init_with_hooks(
            elem_size,
            slots_per_cluster,
            finalizer,
            default_acquire,
            default_release,
        );
    }

    /// Initialises the pool with caller-supplied raw-memory hooks, e.g. a
    /// page-frame allocator for large clusters.
    pub fn init_with_hooks(
        &mut self,
        elem_size: usize,
        slots_per_cluster: u32,
        finalizer: Option<Finalizer>,
        acquire: AcquireHook,
        release: ReleaseHook,
    ) {
        assert!(elem_size > 0, "elem_size must be non-zero");
        assert!(slots_per_cluster > 0, "slots_per_cluster must be non-zero");

        let word = size_of::<usize>();
        let rounded = align_up_usize(elem_size.max(MIN_SLOT_SIZE), word);
        let header_size = align_up_usize(size_of::<ClusterHeader>(), word);
        let bitmap_off = header_size;
        let bitmap_bytes = crate::bitmap::bitmap_bytes(slots_per_cluster);
        let slots_off = align_up_usize(bitmap_off + bitmap_bytes, word);
        let cluster_size = slots_off + rounded * slots_per_cluster as usize;

        self.elem_size = rounded;
        self.slots_per_cluster = slots_per_cluster;
        self.cluster_size = cluster_size;
        self.bitmap_off = bitmap_off;
        self.slots_off = slots_off;
        self.clusters.init();
        for bucket in &mut self.buckets {
            bucket.init();
        }
        self.linger = ptr::null_mut();
        self.free_count = 0;
        self.clusters_allocated = 0;
        self.finalizer = finalizer;
        self.acquire = acquire;
        self.release = release;
        self.initialized = true;

        klog_debug!(
            "pool: init elem_size={} slots_per_cluster={} cluster_size={}",
            self.elem_size,
            self.slots_per_cluster,
            self.cluster_size
        );
    }

    /// Releases every cluster back through the release hook, invoking the
    /// finalizer (if any) on every slot still occupied. Leaves the pool in
    /// the same state as a fresh `init` with the same parameters, so a
    /// `Pool` may be reused after `destroy`.
    pub fn destroy(&mut self) {
        assert!(self.initialized, "destroy on uninitialized pool");

        let mut released = 0usize;
        loop {
            let node = unsafe { self.clusters.pop_tail() };
            if node.is_null() {
                break;
            }
            let header = header_of_node(node);
            unsafe { self.finalize_cluster(header) };
            unsafe { self.release_cluster(header) };
            released += 1;
        }

        klog_debug!("pool: destroy released {} clusters", released);

        self.init_with_hooks(
            self.elem_size,
            self.slots_per_cluster,
            self.finalizer,
            self.acquire,
            self.release,
        );
    }

    /// Ensures at least `n` slots are available, acquiring clusters as
    /// needed.
    pub fn reserve(&mut self, n: usize) -> PoolResult<()> {
        assert!(self.initialized, "reserve on uninitialized pool");
        while self.free_count < n {
            self.acquire_cluster().ok_or(PoolError::Exhausted)?;
        }
        Ok(())
    }

    pub fn available(&self) -> usize {
        self.free_count
    }

    pub fn clusters_allocated(&self) -> usize {
        self.clusters_allocated
    }

    /// Hands out one slot, or `None` if the pool is exhausted (the acquire
    /// hook failed to grow it). `hint`, if given an address inside a live
    /// cluster, is tried first for locality before falling back to the
    /// general (far-allocation) bucket scan.
    pub fn alloc(&mut self, hint: Option<*mut u8>) -> Option<*mut u8> {
        assert!(self.initialized, "alloc on uninitialized pool");

        let spc = self.slots_per_cluster as usize;
        let need_cluster = self.free_count == 0 || (hint.is_none() && self.free_count < spc / 2);
        if need_cluster && self.acquire_cluster().is_none() && self.free_count == 0 {
            // The trigger wanted a new cluster and couldn't get one; only
            // fail outright if there's nothing left in the free-lists to
            // satisfy the request from anyway.
            return None;
        }

        let slot = self.find_run(1, hint)?;
        Some(slot)
    }

    /// Returns a previously allocated slot. `slot_ref` is cleared to null
    /// on return, matching the consumed-pointer convention used elsewhere
    /// in this workspace's allocators.
    pub fn free(&mut self, slot_ref: &mut *mut u8) {
        assert!(self.initialized, "free on uninitialized pool");
        let addr = *slot_ref;
        assert!(!addr.is_null(), "free of a null slot");

        let header_ptr = self.find_cluster(addr).expect("free of a foreign address");
        let header = unsafe { &mut *header_ptr };

        let index = unsafe { header.slot_index(addr) };
        debug_assert!(index < header.slot_count);

        unsafe { self.free_index(header_ptr, header, index) };

        *slot_ref = ptr::null_mut();
    }

    unsafe fn free_index(&mut self, header_ptr: *mut ClusterHeader, header: &mut ClusterHeader, index: u32) {
        debug_assert!(
            !slot_is_free(header, index),
            "double free: slot is already part of a free run"
        );

        let bitmap = header.bitmap;

        let mut run_start = index;
        let mut run_len: u32 = 1;

        // Coalesce backward: index-1 is a run's last slot iff its bit is
        // set and it isn't itself a first slot of a length-1 run that is
        // also its own last slot — the bitmap alone can't disambiguate
        // that, so we inspect the overlay at index-1 once we know its bit
        // is set.
        if run_start > 0 && unsafe { crate::bitmap::bit_is_set(bitmap, run_start - 1) } {
            let prev_last = unsafe { header.slot_ptr(run_start - 1) };
            let prev_first = if unsafe { is_first_slot(prev_last) } {
                prev_last
            } else {
                unsafe { back_ptr_of(prev_last) }
            };
            let prev_len = unsafe { run_len_of(prev_first) };
            let prev_first_index = unsafe { header.slot_index(prev_first) };

            unsafe { ListHead::unlink_fast(node_ptr(prev_first)) };
            unsafe { crate::bitmap::clear_bit(bitmap, prev_first_index) };
            if prev_len >= 2 {
                unsafe { crate::bitmap::clear_bit(bitmap, prev_first_index + prev_len - 1) };
            }

            run_start = prev_first_index;
            run_len += prev_len;
        }

        // Coalesce forward: index+1 is a run's first slot iff its bit is
        // set and the overlay there is a FirstSlotOverlay.
        let next_index = index + 1;
        if next_index < header.slot_count && unsafe { crate::bitmap::bit_is_set(bitmap, next_index) } {
            let next_slot = unsafe { header.slot_ptr(next_index) };
            if unsafe { is_first_slot(next_slot) } {
                let next_len = unsafe { run_len_of(next_slot) };

                unsafe { ListHead::unlink_fast(node_ptr(next_slot)) };
                unsafe { crate::bitmap::clear_bit(bitmap, next_index) };
                if next_len >= 2 {
                    unsafe { crate::bitmap::clear_bit(bitmap, next_index + next_len - 1) };
                }

                run_len += next_len;
            }
        }

        let first_slot = unsafe { header.slot_ptr(run_start) };
        unsafe { slot::write_first(first_slot, run_len as usize) };
        unsafe { crate::bitmap::set_bit(bitmap, run_start) };
        if run_len >= 2 {
            let last_index = run_start + run_len - 1;
            let last_slot = unsafe { header.slot_ptr(last_index) };
            unsafe { slot::write_last(last_slot, first_slot) };
            unsafe { crate::bitmap::set_bit(bitmap, last_index) };
        }

        let bucket = bucket_index(run_len);
        unsafe { self.buckets[bucket].insert_head(node_ptr(first_slot)) };

        header.free_count += 1;
        self.free_count += 1;

        self.maybe_linger(header_ptr, header);
    }

    fn maybe_linger(&mut self, header_ptr: *mut ClusterHeader, header: &mut ClusterHeader) {
        if !header.is_entirely_free() {
            return;
        }
        if self.linger.is_null() {
            self.linger = header_ptr;
            return;
        }
        if self.linger == header_ptr {
            return;
        }
        // A different cluster is already lingering and this one is also
        // fully free: evict the older lingering cluster, this one becomes
        // the new linger candidate.
        let evict = self.linger;
        self.linger = header_ptr;
        unsafe { self.evict_cluster(evict) };
    }

    unsafe fn evict_cluster(&mut self, header_ptr: *mut ClusterHeader) {
        let header = unsafe { &*header_ptr };
        debug_assert!(header.is_entirely_free());

        // Remove every run this cluster contributed from its bucket.
        let spc = header.slot_count;
        let mut i = 0u32;
        while i < spc {
            if unsafe { crate::bitmap::bit_is_set(header.bitmap, i) } {
                let candidate = unsafe { header.slot_ptr(i) };
                if unsafe { is_first_slot(candidate) } {
                    unsafe { ListHead::unlink_fast(node_ptr(candidate)) };
                    let len = unsafe { run_len_of(candidate) } as u32;
                    i += len;
                    continue;
                }
            }
            i += 1;
        }

        unsafe { ListHead::unlink_fast(ptr::addr_of_mut!((*header_ptr).node)) };
        unsafe { self.release_cluster(header_ptr) };
    }

    fn acquire_cluster(&mut self) -> Option<()> {
        let mem = (self.acquire)(self.cluster_size)?;

        let header_ptr = mem as *mut ClusterHeader;
        let bitmap = unsafe { mem.add(self.bitmap_off) } as *mut usize;
        let slots = unsafe { mem.add(self.slots_off) };

        unsafe {
            ptr::write(
                header_ptr,
                ClusterHeader {
                    node: ListNode::empty(),
                    slot_count: self.slots_per_cluster,
                    free_count: self.slots_per_cluster,
                    bitmap,
                    slots,
                    elem_size: self.elem_size,
                },
            );
        }

        let bitmap_words = crate::bitmap::bitmap_words(self.slots_per_cluster);
        for i in 0..bitmap_words {
            unsafe { ptr::write(bitmap.add(i), 0) };
        }

        let run_len = self.slots_per_cluster as usize;
        unsafe {
            slot::write_first(slots, run_len);
            crate::bitmap::set_bit(bitmap, 0);
            if run_len >= 2 {
                let last = (*header_ptr).slot_ptr(self.slots_per_cluster - 1);
                slot::write_last(last, slots);
                crate::bitmap::set_bit(bitmap, self.slots_per_cluster - 1);
            }
        }

        let bucket = bucket_index(self.slots_per_cluster);
        unsafe { self.buckets[bucket].insert_head(node_ptr(slots)) };

        unsafe { self.clusters.insert_head(ptr::addr_of_mut!((*header_ptr).node)) };

        self.free_count += self.slots_per_cluster as usize;
        self.clusters_allocated += 1;

        klog_debug!(
            "pool: acquired cluster at {:p} size={}",
            mem,
            self.cluster_size
        );

        Some(())
    }

    unsafe fn release_cluster(&mut self, header_ptr: *mut ClusterHeader) {
        let header = unsafe { &*header_ptr };
        let free_count = header.free_count as usize;
        self.free_count -= free_count;
        self.clusters_allocated -= 1;
        if self.linger == header_ptr {
            self.linger = ptr::null_mut();
        }

        klog_debug!("pool: released cluster at {:p}", header_ptr);

        (self.release)(header_ptr as *mut u8, self.cluster_size);
    }

    fn find_cluster(&self, addr: *mut u8) -> Option<*mut ClusterHeader> {
        for node in self.clusters.iter() {
            let header = header_of_node(node);
            if cluster_contains(header, addr, self.cluster_size) {
                return Some(header);
            }
        }
        None
    }

    /// Finds a free run of at least `request` slots, preferring the
    /// hinted cluster's own runs before falling back to the general scan.
    fn find_run(&mut self, request: u32, hint: Option<*mut u8>) -> Option<*mut u8> {
        if let Some(hint_addr) = hint {
            if let Some(header_ptr) = self.find_cluster(hint_addr) {
                if let Some(slot) = unsafe { self.find_run_in_cluster(header_ptr, request) } {
                    return Some(unsafe { self.take_from_run(slot, request) });
                }
            }
        }
        self.find_run_far(request)
    }

    /// Scans this cluster's bucket entries for a sufficient run without
    /// touching other clusters — used only for the locality-hint path.
    unsafe fn find_run_in_cluster(&self, header_ptr: *mut ClusterHeader, request: u32) -> Option<*mut u8> {
        let start_bucket = bucket_index(request);
        for bucket in &self.buckets[start_bucket..] {
            for node in bucket.iter() {
                let slot = slot_of_node(node);
                if unsafe { run_len_of(slot) } as u32 >= request {
                    let slot_header = self.find_cluster(slot)?;
                    if slot_header == header_ptr {
                        return Some(slot);
                    }
                }
            }
        }
        None
    }

    /// The correctness-baseline allocation path: scan buckets from the
    /// smallest that can possibly satisfy `request` upward, taking the
    /// first sufficient run found, independent of cluster locality.
    fn find_run_far(&mut self, request: u32) -> Option<*mut u8> {
        let start_bucket = bucket_index(request);
        for bucket in &self.buckets[start_bucket..] {
            for node in bucket.iter() {
                let slot = slot_of_node(node);
                if unsafe { run_len_of(slot) } as u32 >= request {
                    return Some(unsafe { self.take_from_run(slot, request) });
                }
            }
        }
        None
    }

    /// Removes `first_slot`'s run from its bucket, splits off `request`
    /// slots from the front, and returns the first of those. Any
    /// remainder is re-bucketed as a fresh run.
    unsafe fn take_from_run(&mut self, first_slot: *mut u8, request: u32) -> *mut u8 {
        let run_len = unsafe { run_len_of(first_slot) } as u32;
        debug_assert!(run_len >= request);

        unsafe { ListHead::unlink_fast(node_ptr(first_slot)) };

        let header_ptr = self
            .find_cluster(first_slot)
            .expect("run belongs to a live cluster");
        let header = unsafe { &mut *header_ptr };
        let bitmap = header.bitmap;
        let first_index = unsafe { header.slot_index(first_slot) };

        unsafe { crate::bitmap::clear_bit(bitmap, first_index) };
        if run_len >= 2 {
            unsafe { crate::bitmap::clear_bit(bitmap, first_index + run_len - 1) };
        }

        let remainder = run_len - request;
        if remainder > 0 {
            let rem_start = first_index + request;
            let rem_slot = unsafe { header.slot_ptr(rem_start) };
            unsafe { slot::write_first(rem_slot, remainder as usize) };
            unsafe { crate::bitmap::set_bit(bitmap, rem_start) };
            if remainder >= 2 {
                let rem_last = rem_start + remainder - 1;
                let rem_last_slot = unsafe { header.slot_ptr(rem_last) };
                unsafe { slot::write_last(rem_last_slot, rem_slot) };
                unsafe { crate::bitmap::set_bit(bitmap, rem_last) };
            }
            let bucket = bucket_index(remainder);
            unsafe { self.buckets[bucket].insert_head(node_ptr(rem_slot)) };
        }

        header.free_count -= request;
        self.free_count -= request as usize;

        if self.linger == header_ptr && !header.is_entirely_free() {
            self.linger = ptr::null_mut();
        }

        first_slot
    }

    /// Walks every slot of `header`, invoking the finalizer on every
    /// slot that is *not* part of a free run. Runs are identified by the
    /// same first/last-overlay scheme the allocator uses, so no separate
    /// occupancy bitmap is needed.
    unsafe fn finalize_cluster(&self, header_ptr: *mut ClusterHeader) {
        let Some(finalizer) = self.finalizer else {
            return;
        };
        let header = unsafe { &*header_ptr };
        let spc = header.slot_count;
        let mut i = 0u32;
        while i < spc {
            if unsafe { crate::bitmap::bit_is_set(header.bitmap, i) } {
                let candidate = unsafe { header.slot_ptr(i) };
                if unsafe { is_first_slot(candidate) } {
                    let len = unsafe { run_len_of(candidate) } as u32;
                    i += len;
                    continue;
                }
            }
            finalizer(unsafe { header.slot_ptr(i) });
            i += 1;
        }
    }

    /// Walks every cluster's bitmap and every bucket, cross-checking the
    /// invariants described for the free-run encoding. Not called
    /// automatically outside tests — it is O(clusters * slots_per_cluster).
    #[cfg(debug_assertions)]
    pub fn debug_check_invariants(&self) -> bool {
        let mut total_free = 0usize;

        for node in self.clusters.iter() {
            let header = unsafe { &*header_of_node(node) };
            let spc = header.slot_count;
            let mut i = 0u32;
            let mut free_in_cluster = 0u32;

            while i < spc {
                if unsafe { crate::bitmap::bit_is_set(header.bitmap, i) } {
                    let slot = unsafe { header.slot_ptr(i) };
                    if !unsafe { is_first_slot(slot) } {
                        // Lone set bit belonging to a last-slot overlay
                        // with no matching first-slot bit: invariant 3
                        // violation (dangling endpoint).
                        return false;
                    }
                    let len = unsafe { run_len_of(slot) } as u32;
                    if len == 0 || i + len > spc {
                        return false;
                    }
                    if len >= 2 {
                        let last_index = i + len - 1;
                        if !unsafe { crate::bitmap::bit_is_set(header.bitmap, last_index) } {
                            return false;
                        }
                        let last_slot = unsafe { header.slot_ptr(last_index) };
                        if unsafe { back_ptr_of(last_slot) } != slot {
                            return false;
                        }
                    }
                    free_in_cluster += len;
                    i += len;
                } else {
                    i += 1;
                }
            }

            if free_in_cluster != header.free_count {
                return false;
            }
            total_free += free_in_cluster as usize;
        }

        if total_free != self.free_count {
            return false;
        }

        for (bucket_num, bucket) in self.buckets.iter().enumerate() {
            for node in bucket.iter() {
                let slot = slot_of_node(node);
                let len = unsafe { run_len_of(slot) } as u32;
                if bucket_index(len) != bucket_num {
                    return false;
                }
            }
        }

        true
    }
}
