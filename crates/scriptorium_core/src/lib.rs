pub mod domain;
pub mod ports;
pub mod slug;

pub use domain::{
    Book, BookSummary, ExportedPage, LibraryStats, Message, NewBook, NewPage, Page,
    PageAssignment, PageFilter, PageListing, PageStatus, PageText, Reply, Role, User,
    UserCredentials, UserImport, UserUpdate,
};
pub use ports::{LibraryStore, PageRasterizer, PageStream, PortError, PortResult};
