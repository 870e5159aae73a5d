//! Gravatar projection plugin.
//!
//! Tracks the mainnet Gravatar registry contract and projects its two
//! events into `Gravatar` entities: `NewGravatar` creates a profile,
//! `UpdatedGravatar` rewrites an existing one. The pair exercises the
//! insert/update distinction end to end — an update on a missing profile is
//! a hard failure, never a silent create.

use std::sync::Arc;

use entindex_core::{
    DecodedEvent, Entity, EntityContext, EntityRow, EventHandler, EventSchema, FieldDef,
    FieldKind, FieldValue, HandlerError, HandlerRegistry, RegistryError, SchemaRegistry,
};

/// Mainnet Gravatar registry contract.
pub const GRAVATAR_REGISTRY: &str = "0x2e645469f354bb4f5c8a05b3b30a929361cf77ec";

// ─── Entity ───────────────────────────────────────────────────────────────────

/// A Gravatar profile, keyed by the registry's numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gravatar {
    /// Decimal form of the on-chain uint256 id.
    pub id: String,
    pub owner: String,
    pub display_name: String,
    pub image_url: String,
}

impl Entity for Gravatar {
    const KIND: &'static str = "Gravatar";

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::new(self.id.clone())
            .field("owner", FieldValue::Address(self.owner.clone()))
            .field("displayName", FieldValue::Str(self.display_name.clone()))
            .field("imageUrl", FieldValue::Str(self.image_url.clone()))
    }

    fn from_row(row: &EntityRow) -> Option<Self> {
        Some(Self {
            id: row.id.clone(),
            owner: row.get("owner")?.as_address()?.to_string(),
            display_name: row.get("displayName")?.as_str()?.to_string(),
            image_url: row.get("imageUrl")?.as_str()?.to_string(),
        })
    }
}

/// Both Gravatar events carry the same four params; map them into the
/// typed entity.
fn gravatar_from_event(event: &DecodedEvent) -> Result<Gravatar, HandlerError> {
    let id = event.require("id")?.as_decimal().ok_or_else(|| HandlerError::BadParam {
        name: "id".into(),
        reason: "expected a numeric id".into(),
    })?;
    let owner = event
        .require("owner")?
        .as_address()
        .ok_or_else(|| HandlerError::BadParam {
            name: "owner".into(),
            reason: "expected an address".into(),
        })?
        .to_string();
    let display_name = event
        .require("displayName")?
        .as_str()
        .ok_or_else(|| HandlerError::BadParam {
            name: "displayName".into(),
            reason: "expected a string".into(),
        })?
        .to_string();
    let image_url = event
        .require("imageUrl")?
        .as_str()
        .ok_or_else(|| HandlerError::BadParam {
            name: "imageUrl".into(),
            reason: "expected a string".into(),
        })?
        .to_string();
    Ok(Gravatar { id, owner, display_name, image_url })
}

// ─── Handlers ─────────────────────────────────────────────────────────────────

/// `NewGravatar` — insert a fresh profile. Fails if the id already exists.
pub struct NewGravatarHandler;

impl EventHandler for NewGravatarHandler {
    fn handle(
        &self,
        event: &DecodedEvent,
        ctx: &mut dyn EntityContext,
    ) -> Result<(), HandlerError> {
        let gravatar = gravatar_from_event(event)?;
        ctx.insert(Gravatar::KIND, gravatar.to_row())?;
        Ok(())
    }
}

/// `UpdatedGravatar` — rewrite an existing profile. Fails if the id is
/// unknown (unless the store is configured for upserts).
pub struct UpdatedGravatarHandler;

impl EventHandler for UpdatedGravatarHandler {
    fn handle(
        &self,
        event: &DecodedEvent,
        ctx: &mut dyn EntityContext,
    ) -> Result<(), HandlerError> {
        let gravatar = gravatar_from_event(event)?;
        ctx.update(Gravatar::KIND, gravatar.to_row())?;
        Ok(())
    }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

fn gravatar_fields() -> Vec<(&'static str, FieldDef)> {
    vec![
        ("id", FieldDef::new(FieldKind::Uint(256))),
        ("owner", FieldDef::new(FieldKind::Address)),
        ("displayName", FieldDef::new(FieldKind::Str)),
        ("imageUrl", FieldDef::new(FieldKind::Str)),
    ]
}

/// The two event schemas, scoped to the registry contract.
pub fn schemas() -> Vec<EventSchema> {
    vec![
        EventSchema::new("NewGravatar", gravatar_fields()).at_address(GRAVATAR_REGISTRY),
        EventSchema::new("UpdatedGravatar", gravatar_fields()).at_address(GRAVATAR_REGISTRY),
    ]
}

/// Register both schemas.
pub fn register_schemas(registry: &mut SchemaRegistry) -> Result<(), RegistryError> {
    for schema in schemas() {
        registry.register(schema)?;
    }
    Ok(())
}

/// Register both handlers under the registry contract address.
pub fn register_handlers(registry: &mut HandlerRegistry) -> Result<(), RegistryError> {
    registry.register(GRAVATAR_REGISTRY, "NewGravatar", Arc::new(NewGravatarHandler))?;
    registry.register(GRAVATAR_REGISTRY, "UpdatedGravatar", Arc::new(UpdatedGravatarHandler))?;
    Ok(())
}
