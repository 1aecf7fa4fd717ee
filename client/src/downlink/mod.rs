pub mod observer;
mod view;

pub use observer::{DownlinkObserver, SharedObserver, ViewEvent};
pub use view::{DownlinkView, EventDownlink, ListDownlink, MapDownlink, ValueDownlink};
