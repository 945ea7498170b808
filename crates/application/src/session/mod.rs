mod address_book;
mod device_session;
mod test_task;
mod timings;
mod worker;

pub use address_book::AddressBook;
pub use device_session::DeviceSession;
pub(crate) use device_session::SessionShared;
pub use test_task::TestMode;
pub use timings::SessionTimings;
