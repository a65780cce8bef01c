pub mod collective;
pub mod pool;
pub mod santri;
pub mod transaction;
pub mod wallet;
pub mod withdrawal;

pub use collective::{
    CollectivePayment, CollectivePaymentItem, CollectiveStatus, ItemStatus, TargetRule,
};
pub use pool::{Pool, EPOS_POOL_NAME};
pub use santri::Santri;
pub use transaction::{new_reference, Direction, Method, PostEntry, WalletTransaction};
pub use wallet::Wallet;
pub use withdrawal::{CashWithdrawal, EposWithdrawal, PaymentMethod, WithdrawalStatus};
