//! Menu, cart, and checkout commands.

use tasty_bites_client::{CheckoutDetails, Store};
use tasty_bites_core::{Email, PaymentMethod, ProductId};

use super::CliError;

/// List the menu.
///
/// # Errors
///
/// Returns an error if the catalog cannot be fetched.
pub async fn products(store: &Store) -> Result<(), CliError> {
    let products = store.catalog().list_products().await?;
    if products.is_empty() {
        tracing::info!("The menu is empty");
    }
    for product in &products {
        tracing::info!(
            "{:<26} {:<32} {:>10}  {}",
            product.id,
            product.name,
            product.price,
            product.category.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub fn show_cart(store: &Store) {
    let cart = store.snapshot().cart;
    if cart.is_empty() {
        tracing::info!("Your cart is empty");
        return;
    }
    for line in cart.lines() {
        tracing::info!(
            "{:<26} {:<32} {:>3} x {:>10} = {:>10}",
            line.product_id,
            line.name,
            line.quantity,
            line.price,
            line.line_total()
        );
    }
    tracing::info!("{} items, subtotal {}", cart.total_quantity(), cart.subtotal());
}

/// Add one unit of a catalog product.
///
/// # Errors
///
/// Returns an error if the product cannot be fetched.
pub async fn add(store: &Store, product_id: &str) -> Result<(), CliError> {
    let product = store
        .catalog()
        .get_product(&ProductId::new(product_id))
        .await?;
    store.add_item(product.to_cart_line());
    tracing::info!("Added {} to the cart", product.name);
    show_cart(store);
    Ok(())
}

/// # Errors
///
/// Returns `CliError::NotInCart` if the product is not in the cart.
pub fn increase(store: &Store, product_id: &str) -> Result<(), CliError> {
    if !store.increase_quantity(&ProductId::new(product_id)) {
        return Err(CliError::NotInCart(product_id.to_string()));
    }
    show_cart(store);
    Ok(())
}

/// # Errors
///
/// Returns `CliError::NotInCart` if the product is not in the cart.
pub fn decrease(store: &Store, product_id: &str) -> Result<(), CliError> {
    let id = ProductId::new(product_id);
    if store.snapshot().cart.get(&id).is_none() {
        return Err(CliError::NotInCart(product_id.to_string()));
    }
    if !store.decrease_quantity(&id) {
        tracing::info!("Quantity is already 1; use `cart remove` to drop the line");
    }
    show_cart(store);
    Ok(())
}

/// # Errors
///
/// Returns `CliError::NotInCart` if the product is not in the cart.
pub fn remove(store: &Store, product_id: &str) -> Result<(), CliError> {
    if !store.remove_item(&ProductId::new(product_id)) {
        return Err(CliError::NotInCart(product_id.to_string()));
    }
    show_cart(store);
    Ok(())
}

pub fn clear(store: &Store) {
    store.clear_cart();
    tracing::info!("Cart cleared");
}

/// Validate checkout arguments.
///
/// # Errors
///
/// Returns `CliError::InvalidArgument` for a malformed email, an unknown
/// payment method, or a blank required field.
pub fn checkout_details(
    name: String,
    email: &str,
    phone: String,
    shipping_address: String,
    payment: &str,
    notes: String,
) -> Result<CheckoutDetails, CliError> {
    for (field, value) in [("name", &name), ("phone", &phone), ("address", &shipping_address)] {
        if value.trim().is_empty() {
            return Err(CliError::invalid(field, "must not be blank"));
        }
    }

    Ok(CheckoutDetails {
        name,
        email: Email::parse(email).map_err(|e| CliError::invalid("email", e))?,
        phone,
        shipping_address,
        payment_method: payment
            .parse::<PaymentMethod>()
            .map_err(|e| CliError::invalid("payment", e))?,
        notes,
    })
}

/// Submit the cart as an order.
///
/// # Errors
///
/// Returns an error if the user is not signed in, the cart is empty, or the
/// order is rejected.
pub async fn checkout(store: &Store, details: &CheckoutDetails) -> Result<(), CliError> {
    if !store.snapshot().is_authenticated() {
        return Err(CliError::NotSignedIn);
    }
    let order = store.checkout(details).await?;
    tracing::info!(
        "Order placed: {} ({}), total {}",
        order.label(),
        order.status,
        order.total_amount
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn details(payment: &str, phone: &str) -> Result<CheckoutDetails, CliError> {
        checkout_details(
            "An".to_string(),
            "an@example.com",
            phone.to_string(),
            "12 Le Loi".to_string(),
            payment,
            String::new(),
        )
    }

    #[test]
    fn test_checkout_details_parses_payment() {
        let details = details("bank_transfer", "0901").unwrap();
        assert_eq!(details.payment_method, PaymentMethod::BankTransfer);
    }

    #[test]
    fn test_checkout_details_rejects_bad_input() {
        assert!(matches!(
            details("cheque", "0901"),
            Err(CliError::InvalidArgument { field: "payment", .. })
        ));
        assert!(matches!(
            details("cash", "   "),
            Err(CliError::InvalidArgument { field: "phone", .. })
        ));
    }
}
