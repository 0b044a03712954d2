//! Order commands.

use tasty_bites_client::Store;
use tasty_bites_core::{OrderId, OrderStatus};

use super::CliError;

fn require_session(store: &Store) -> Result<(), CliError> {
    if store.snapshot().is_authenticated() {
        Ok(())
    } else {
        Err(CliError::NotSignedIn)
    }
}

/// # Errors
///
/// Returns an error if the user is not signed in or the request fails.
pub async fn list(store: &Store, page: u32, limit: u32) -> Result<(), CliError> {
    require_session(store)?;
    let page = store.orders().list(page, limit).await?;
    for order in &page.orders {
        tracing::info!(
            "{:<26} {:<20} {:<11} {:>10}",
            order.id,
            order.label(),
            order.status,
            order.total_amount
        );
    }
    if let Some(pagination) = page.pagination {
        tracing::info!(
            "Page {}/{} ({} orders)",
            pagination.current_page,
            pagination.total_pages,
            pagination.total_orders
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the user is not signed in or the order cannot be fetched.
pub async fn show(store: &Store, order_id: &str) -> Result<(), CliError> {
    require_session(store)?;
    let order = store.orders().get(&OrderId::new(order_id)).await?;
    tracing::info!("{} [{}]", order.label(), order.status);
    for item in &order.items {
        tracing::info!("  {:>3} x {:<32} {:>10}", item.quantity, item.name, item.price);
    }
    tracing::info!("Total {}", order.total_amount);
    Ok(())
}

/// # Errors
///
/// Returns an error for an unknown status, a missing session, or a rejected
/// update.
pub async fn set_status(store: &Store, order_id: &str, status: &str) -> Result<(), CliError> {
    let status: OrderStatus = status.parse().map_err(|e| CliError::invalid("status", e))?;
    require_session(store)?;
    let order = store
        .orders()
        .update_status(&OrderId::new(order_id), status)
        .await?;
    tracing::info!("{} is now {}", order.label(), order.status);
    Ok(())
}

/// # Errors
///
/// Returns an error if the user is not signed in or the delete is rejected.
pub async fn delete(store: &Store, order_id: &str) -> Result<(), CliError> {
    require_session(store)?;
    store.orders().delete(&OrderId::new(order_id)).await?;
    tracing::info!("Order {order_id} deleted");
    Ok(())
}
