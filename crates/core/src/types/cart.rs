//! Shopping cart lines and their state transitions.
//!
//! The cart holds at most one line per product and no line ever drops below
//! a quantity of 1: decrementing floors at 1, and removal is a separate
//! operation. Carts read back from storage are normalized so both rules hold
//! no matter what was persisted.

use serde::{Deserialize, Serialize};

use crate::types::id::ProductId;
use crate::types::price::Price;

/// One product line in the cart.
///
/// `name`, `price` and `image` are captured when the product is added so the
/// cart can be displayed without a catalog round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(alias = "id", alias = "_id")]
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub price: Price,
    #[serde(default, alias = "imageRef", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

impl CartLine {
    /// Snapshot of a product with quantity 1.
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, name: impl Into<String>, price: Price) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            price,
            image: None,
            quantity: 1,
        }
    }

    /// Attach an image reference.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Price of this line (unit price times quantity).
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.line_total(self.quantity)
    }
}

/// The shopping cart.
///
/// Serializes as a plain JSON array of [`CartLine`]s, which is the format
/// persisted under the `cart` storage key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CartLine>", into = "Vec<CartLine>")]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from arbitrary lines, merging duplicates and flooring
    /// quantities at 1. Line order follows first appearance.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new();
        for mut line in lines {
            line.quantity = line.quantity.max(1);
            match cart.position(&line.product_id) {
                Some(idx) => {
                    if let Some(existing) = cart.lines.get_mut(idx) {
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                    }
                }
                None => cart.lines.push(line),
            }
        }
        cart
    }

    /// The cart's lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Look up the line for a product.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.product_id == product_id)
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    fn position(&self, product_id: &ProductId) -> Option<usize> {
        self.lines.iter().position(|l| &l.product_id == product_id)
    }

    /// Add one unit of a product.
    ///
    /// Increments the existing line if the product is already in the cart,
    /// otherwise appends `item` with a quantity of 1 (the incoming quantity is
    /// ignored).
    pub fn add_item(&mut self, item: CartLine) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == item.product_id) {
            line.quantity = line.quantity.saturating_add(1);
        } else {
            self.lines.push(CartLine { quantity: 1, ..item });
        }
    }

    /// Increment a line's quantity. Returns `false` if the product is not in the cart.
    pub fn increase_quantity(&mut self, product_id: &ProductId) -> bool {
        self.lines
            .iter_mut()
            .find(|l| &l.product_id == product_id)
            .is_some_and(|line| {
                line.quantity = line.quantity.saturating_add(1);
                true
            })
    }

    /// Decrement a line's quantity, never below 1.
    ///
    /// Returns `true` only if the quantity actually changed.
    pub fn decrease_quantity(&mut self, product_id: &ProductId) -> bool {
        self.lines
            .iter_mut()
            .find(|l| &l.product_id == product_id)
            .is_some_and(|line| {
                if line.quantity > 1 {
                    line.quantity -= 1;
                    true
                } else {
                    false
                }
            })
    }

    /// Remove a product's line. Returns `false` if it was not present.
    pub fn remove_item(&mut self, product_id: &ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.product_id != product_id);
        self.lines.len() != before
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl From<Vec<CartLine>> for Cart {
    fn from(lines: Vec<CartLine>) -> Self {
        Self::from_lines(lines)
    }
}

impl From<Cart> for Vec<CartLine> {
    fn from(cart: Cart) -> Self {
        cart.lines
    }
}
