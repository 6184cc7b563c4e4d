pub mod request;
pub mod response;

pub use request::{
    FetchRequest, RaySlotFetchRequest, RaySlotWithTagFetchRequest, RayWindow, RayWindowPayload,
};
pub use response::{condense_entries, DateBreaks, FetchResponse};
