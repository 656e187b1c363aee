pub mod connected_account;
pub mod dispute;
pub mod notification;
pub mod offer;
pub mod ticket;
pub mod transaction;
pub mod webhook_event;

pub use connected_account::ConnectedAccount;
pub use dispute::{DisputeStatus, TicketDispute};
pub use notification::Notification;
pub use offer::{OfferStatus, TicketOffer};
pub use ticket::{SaleStatus, UserTicket};
pub use transaction::{EscrowStatus, Transaction, TransactionStatus};
pub use webhook_event::ProcessedWebhookEvent;
