//! Per-user ingredient stock, embedded in the user document and keyed by
//! ingredient name.

use std::sync::Arc;

use bson::DateTime;

use crate::error::CoreError;
use crate::schemas::InventoryItem;
use crate::store::UserStore;

/// Parse a `name:quantity:unit` stock entry, e.g. `豆腐:1:丁`. Malformed
/// input is a user-correctable `InvalidInput`, not a system error.
pub fn parse_inventory_spec(spec: &str) -> Result<InventoryItem, CoreError> {
    let mut parts = spec.splitn(3, ':');
    let name = parts.next().unwrap_or_default().trim();
    let quantity = parts.next().unwrap_or_default().trim();
    let unit = parts.next().unwrap_or_default().trim();

    if name.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "missing ingredient name in '{}'",
            spec
        )));
    }
    let quantity: f64 = quantity.parse().map_err(|_| {
        CoreError::InvalidInput(format!(
            "'{}' has no parseable quantity; expected name:quantity:unit",
            spec
        ))
    })?;
    if quantity < 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "negative quantity in '{}'",
            spec
        )));
    }

    Ok(InventoryItem {
        name: name.to_string(),
        quantity,
        unit: unit.to_string(),
    })
}

#[derive(Clone)]
pub struct InventoryService {
    users: Arc<dyn UserStore>,
}

impl InventoryService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Current stock and last-update time. An unknown user just has an
    /// empty inventory.
    pub async fn get(
        &self,
        user_id: &str,
    ) -> Result<(Vec<InventoryItem>, Option<DateTime>), CoreError> {
        match self.users.find_session(user_id).await? {
            Some(session) => Ok((session.inventory, session.updated_at)),
            None => Ok((Vec::new(), None)),
        }
    }

    /// Partial update: upsert each `update` item by name, then drop each
    /// name in `remove`. Returns the resulting stock.
    pub async fn patch(
        &self,
        user_id: &str,
        update: &[InventoryItem],
        remove: &[String],
    ) -> Result<Vec<InventoryItem>, CoreError> {
        let (mut items, _) = self.get(user_id).await?;

        for incoming in update {
            match items.iter_mut().find(|item| item.name == incoming.name) {
                Some(existing) => *existing = incoming.clone(),
                None => items.push(incoming.clone()),
            }
        }
        for name in remove {
            items.retain(|item| &item.name != name);
        }

        self.users.set_inventory(user_id, &items).await?;
        Ok(items)
    }
}
