//! DMA-capable memory
//!
//! - [`LockedBuffer`]: pinned, zeroed pages shared with the DMA engine
//! - [`PageMap`]: virtual/bus address translation for those pages

pub mod locked;
pub mod pagemap;

pub use locked::LockedBuffer;
pub use pagemap::{FrameSource, PageMap, PageMapEntry, ProcPagemap, SimulatedFrames};
