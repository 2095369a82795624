//! Data page view for record files.
//!
//! A data page holds fixed-width records in a slot array with a bitmap
//! tracking occupancy:
//!
//! ```text
//! +------------------------+ offset 0
//! | RecordPageHeader (8B)  |
//! +------------------------+ offset 8
//! | Bitmap                 | (one bit per slot, LSB-first)
//! +------------------------+
//! | Slot Array             | (records_per_page × record_size bytes)
//! +------------------------+
//! | (unused tail)          |
//! +------------------------+ offset 8192
//! ```
//!
//! The geometry comes from the owning file's [`PageLayout`]; the view itself
//! is just typed access over a `PAGE_SIZE` byte buffer.

use super::SlotId;
use super::bitmap;
use super::header::{PageLayout, RECORD_PAGE_HEADER_SIZE, RecordPageHeader};
use crate::storage::PAGE_SIZE;

/// A record page view over a page-sized byte buffer.
///
/// The type parameter `T` allows this to wrap:
/// - `&[u8]` - read-only view
/// - `&mut [u8]` - mutable view
/// - Any type implementing `AsRef<[u8]>` (and optionally `AsMut<[u8]>`)
pub struct RecordPage<T> {
    data: T,
    layout: PageLayout,
}

// Read-only methods (available for any T: AsRef<[u8]>)
impl<T: AsRef<[u8]>> RecordPage<T> {
    /// Creates a new page view over the given data.
    ///
    /// # Panics
    ///
    /// Panics if `data.as_ref().len() != PAGE_SIZE`.
    pub fn new(data: T, layout: PageLayout) -> Self {
        assert_eq!(
            data.as_ref().len(),
            PAGE_SIZE,
            "RecordPage requires exactly {} bytes, got {}",
            PAGE_SIZE,
            data.as_ref().len()
        );
        Self { data, layout }
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Returns the page header.
    pub fn header(&self) -> RecordPageHeader {
        RecordPageHeader::read_from(&self.data()[..RECORD_PAGE_HEADER_SIZE])
    }

    /// Returns the occupancy bitmap.
    pub fn bitmap(&self) -> &[u8] {
        let start = self.layout.bitmap_offset();
        &self.data()[start..start + self.layout.bitmap_size]
    }

    /// Returns whether the slot holds a record.
    pub fn is_occupied(&self, slot_no: SlotId) -> bool {
        debug_assert!((slot_no as usize) < self.layout.records_per_page);
        bitmap::is_set(self.bitmap(), slot_no as usize)
    }

    /// Returns the record bytes in the given slot.
    ///
    /// The slot contents are returned regardless of occupancy; callers check
    /// the bitmap first.
    pub fn slot(&self, slot_no: SlotId) -> &[u8] {
        let start = self.layout.slot_offset(slot_no as usize);
        &self.data()[start..start + self.layout.record_size]
    }

    /// Returns the lowest-index free slot, if any.
    pub fn first_free_slot(&self) -> Option<SlotId> {
        bitmap::first_clear(self.bitmap(), self.layout.records_per_page).map(|i| i as SlotId)
    }

    /// Returns the lowest-index occupied slot at or after `from`, if any.
    pub fn next_occupied_slot(&self, from: SlotId) -> Option<SlotId> {
        bitmap::next_set(self.bitmap(), self.layout.records_per_page, from as usize)
            .map(|i| i as SlotId)
    }

    /// Counts occupied slots via the bitmap.
    ///
    /// Always equals `header().num_records` on a consistent page.
    pub fn occupied_count(&self) -> usize {
        bitmap::count_ones(self.bitmap(), self.layout.records_per_page)
    }

    /// Returns whether every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.header().num_records as usize == self.layout.records_per_page
    }
}

// Mutable methods (available for T: AsRef<[u8]> + AsMut<[u8]>)
impl<T: AsRef<[u8]> + AsMut<[u8]>> RecordPage<T> {
    fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Initializes this page as a new empty data page.
    ///
    /// Zeroes the page and writes an empty header; the zeroed bitmap marks
    /// every slot free.
    pub fn init(&mut self) {
        self.data_mut().fill(0);
        self.set_header(&RecordPageHeader::new());
    }

    /// Sets the page header.
    pub fn set_header(&mut self, header: &RecordPageHeader) {
        header.write_to(&mut self.data_mut()[..RECORD_PAGE_HEADER_SIZE]);
    }

    /// Updates the free-chain link in the page header.
    pub fn set_next_free_page_no(&mut self, page_no: u32) {
        let mut header = self.header();
        header.next_free_page_no = page_no;
        self.set_header(&header);
    }

    fn bitmap_mut(&mut self) -> &mut [u8] {
        let start = self.layout.bitmap_offset();
        let end = start + self.layout.bitmap_size;
        &mut self.data_mut()[start..end]
    }

    /// Writes a record into a free slot: copies the bytes, sets the bitmap
    /// bit, and increments `num_records`.
    ///
    /// # Panics
    ///
    /// Debug-asserts that the slot is currently free.
    pub fn write_record(&mut self, slot_no: SlotId, record: &[u8]) {
        debug_assert!(!self.is_occupied(slot_no), "slot {} occupied", slot_no);
        debug_assert_eq!(record.len(), self.layout.record_size);

        let start = self.layout.slot_offset(slot_no as usize);
        self.data_mut()[start..start + record.len()].copy_from_slice(record);
        bitmap::set(self.bitmap_mut(), slot_no as usize);

        let mut header = self.header();
        header.num_records += 1;
        self.set_header(&header);
    }

    /// Overwrites the record bytes in an occupied slot.
    pub fn overwrite_record(&mut self, slot_no: SlotId, record: &[u8]) {
        debug_assert!(self.is_occupied(slot_no), "slot {} not occupied", slot_no);
        debug_assert_eq!(record.len(), self.layout.record_size);

        let start = self.layout.slot_offset(slot_no as usize);
        self.data_mut()[start..start + record.len()].copy_from_slice(record);
    }

    /// Removes a record: clears the bitmap bit and decrements `num_records`.
    ///
    /// The slot bytes are left in place; the bitmap alone decides occupancy.
    pub fn clear_record(&mut self, slot_no: SlotId) {
        debug_assert!(self.is_occupied(slot_no), "slot {} not occupied", slot_no);

        bitmap::clear(self.bitmap_mut(), slot_no as usize);

        let mut header = self.header();
        header.num_records -= 1;
        self.set_header(&header);
    }
}
