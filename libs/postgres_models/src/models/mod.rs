pub mod credit_adjustments;
pub mod processed_payments;

pub use credit_adjustments::NewCreditAdjustment;
pub use processed_payments::NewProcessedPayment;
