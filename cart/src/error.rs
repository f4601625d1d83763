//! Cart-specific error taxonomy, separate from the `AppError` HTTP envelope
//! so the store layer can be tested without pulling in `axum`.

use composable_rust_web::AppError;

/// Errors the cart store can return.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    /// The write's `expected_version` did not match the stored version.
    #[error("version mismatch")]
    VersionMismatch,
    /// The request referenced a line item that isn't in the cart.
    #[error("item not found")]
    ItemNotFound,
    /// Currency of an add-item request conflicts with the cart's existing currency.
    #[error("currency mismatch: cart is {cart}, request was {request}")]
    CurrencyMismatch {
        /// Currency already fixed on the cart.
        cart: String,
        /// Currency carried by the incoming request.
        request: String,
    },
    /// Underlying Redis failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// Stored value failed to deserialize.
    #[error("corrupt cart data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CartError> for AppError {
    fn from(error: CartError) -> Self {
        match error {
            CartError::VersionMismatch => AppError::conflict("cart version mismatch, refetch and retry"),
            CartError::ItemNotFound => AppError::not_found("CartItem", "requested line"),
            CartError::CurrencyMismatch { cart, request } => {
                AppError::bad_request(format!("cart currency is {cart}, request used {request}"))
            }
            CartError::Redis(source) => AppError::unavailable(format!("cart store unavailable: {source}")),
            CartError::Serialization(source) => AppError::internal(format!("corrupt cart data: {source}")),
        }
    }
}
