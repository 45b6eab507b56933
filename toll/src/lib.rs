pub use toll_ledger::*;
pub use toll_socket::*;
pub use toll_wire::{Frame, Outcome, Registration, Request, Response};
