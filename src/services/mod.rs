// Pure calculations
pub mod discount;

// Stock
pub mod stock_ledger;
pub mod stock_validator;

// Collaborators
pub mod cart;
pub mod customers;
pub mod payment_gateway;

// Order lifecycle
pub mod checkout;
pub mod order_status;
pub mod orders;
pub mod payments;

// Service factory for dependency injection
pub mod factory;
