// ============================================================================
// MODELS
// ============================================================================
//
// One sea-orm entity per table, plus the HTTP request/response shapes.
//
//   - users                : customer accounts
//   - admins               : administrator accounts (soft-disabled via `deprecated`)
//   - refresh_tokens       : one row per logged-in device
//   - products             : catalog prices read by the order ledger
//   - orders / order_items : placed orders with price snapshots
//   - payment_transactions : payment attempts against an order
//   - dto                  : request / response bodies
//   - health               : health check
//
// Money columns are integers in minor currency units (paise / cents).
//
// ============================================================================

pub mod admins;
pub mod dto;
pub mod health;
pub mod order_items;
pub mod orders;
pub mod payment_transactions;
pub mod products;
pub mod refresh_tokens;
pub mod users;
