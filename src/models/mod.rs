pub mod account;
pub mod command;
pub mod money;
pub mod request;
pub mod transaction;

pub use account::{Account, AccountStatus};
pub use command::{Command, CommandType};
pub use money::Money;
pub use request::{PaymentKind, PaymentRequest};
pub use transaction::{RecordMeta, TransactionId, TransactionRecord, TransactionStatus};
