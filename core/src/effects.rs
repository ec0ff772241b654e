use std::collections::BTreeMap;

use crate::ids::ParticipantId;

pub mod resources {
    pub const ARTIFACT: &str = "ARTIFACT";
    pub const OXYGEN: &str = "OXYGEN";
    pub const BATTERY: &str = "BATTERY";
}

/// Host side of an effect: resolves the acting player and applies deltas.
///
/// `player` is `None` for card effects, which always target whoever played
/// the card.
pub trait EffectContext {
    fn player_id(&self) -> Option<ParticipantId>;
    fn update_resource(&mut self, player: Option<ParticipantId>, resource: &str, delta: i64);
}

pub type EffectFn = fn(&mut dyn EffectContext);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    #[error("unknown effect '{0}'")]
    Unknown(String),
}

#[derive(Default, Clone)]
pub struct EffectRegistry {
    effects: BTreeMap<String, EffectFn>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous effect when `name` was already registered.
    pub fn register(&mut self, name: impl Into<String>, effect: EffectFn) -> Option<EffectFn> {
        self.effects.insert(name.into(), effect)
    }

    pub fn get(&self, name: &str) -> Option<EffectFn> {
        self.effects.get(name).copied()
    }

    pub fn invoke(&self, name: &str, ctx: &mut dyn EffectContext) -> Result<(), EffectError> {
        let effect = self
            .get(name)
            .ok_or_else(|| EffectError::Unknown(name.to_string()))?;
        tracing::debug!(effect = name, "invoking effect");
        effect(ctx);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.effects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn grant(ctx: &mut dyn EffectContext, resource: &str, delta: i64) {
    // Tile effects need a landing player; nothing happens without one.
    if let Some(player) = ctx.player_id() {
        ctx.update_resource(Some(player), resource, delta);
    }
}

fn relic_site(ctx: &mut dyn EffectContext) {
    grant(ctx, resources::ARTIFACT, 1);
}

fn energy_vein(ctx: &mut dyn EffectContext) {
    grant(ctx, resources::OXYGEN, 20);
}

fn volcano(ctx: &mut dyn EffectContext) {
    grant(ctx, resources::OXYGEN, -100);
    grant(ctx, resources::BATTERY, -100);
}

fn empty_deep_sea(_ctx: &mut dyn EffectContext) {
    tracing::info!("empty deep sea: nothing happens");
}

fn abyss_landmark(ctx: &mut dyn EffectContext) {
    grant(ctx, resources::ARTIFACT, 5);
}

pub fn cell_effects() -> EffectRegistry {
    let mut registry = EffectRegistry::new();
    registry.register("Relic Site", relic_site);
    registry.register("Energy Vein", energy_vein);
    registry.register("特殊地形 (火山)", volcano);
    registry.register("Empty Deep Sea", empty_deep_sea);
    registry.register("Abyss Landmark", abyss_landmark);
    registry
}

fn emergency_flow(ctx: &mut dyn EffectContext) {
    ctx.update_resource(None, resources::OXYGEN, 10);
}

fn emergency_oxygen(ctx: &mut dyn EffectContext) {
    ctx.update_resource(None, resources::OXYGEN, 20);
}

fn explore(ctx: &mut dyn EffectContext) {
    ctx.update_resource(None, resources::BATTERY, -1);
}

fn sonar_charge(ctx: &mut dyn EffectContext) {
    ctx.update_resource(None, resources::BATTERY, 2);
}

pub fn card_effects() -> EffectRegistry {
    let mut registry = EffectRegistry::new();
    registry.register("緊急流量補給", emergency_flow);
    registry.register("緊急酸素補給", emergency_oxygen);
    registry.register("探索", explore);
    registry.register("ソナー＆チャージ", sonar_charge);
    registry
}
