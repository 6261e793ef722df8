use avian3d::prelude::*;
use bevy::prelude::*;

use super::trigger::TriggerEvent;
use super::trigger::TriggerHandler;

/// Where a tracked object is relative to one portal's volumes
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerState {
    /// Not overlapping the portal
    #[default]
    Outside,
    /// In the outer layer volume only
    Between,
    /// In the transition volume, ready to teleport
    Inside,
}

impl LayerState {
    /// One step towards `target`; states are never skipped
    const fn step_towards(self, target: Self) -> Self {
        match (self, target) {
            (Self::Outside, Self::Between | Self::Inside)
            | (Self::Inside, Self::Outside | Self::Between) => Self::Between,
            (Self::Between, target) => target,
            (state, _) => state,
        }
    }
}

/// Whether state changes rewrite collision layers
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayerMode {
    /// Collision layers follow the state
    #[default]
    Remap,
    /// State is tracked, collision layers stay as they are
    Track,
}

/// Collision layers a portal hands to objects in each state. `None` keeps the
/// layers the object had before it reached the portal.
#[derive(Component, Reflect, Debug, Clone, Default, PartialEq)]
#[reflect(Component)]
pub struct PortalLayer {
    /// Layers while outside
    pub outside: Option<CollisionLayers>,
    /// Layers while in the outer volume, typically passing through the wall
    /// around the portal
    pub between: Option<CollisionLayers>,
    /// Layers while in the transition volume
    pub inside:  Option<CollisionLayers>,
}

impl PortalLayer {
    /// Layers for `state`, falling back to `base`
    pub fn layers_for(&self, state: LayerState, base: CollisionLayers) -> CollisionLayers {
        match state {
            LayerState::Outside => self.outside,
            LayerState::Between => self.between,
            LayerState::Inside => self.inside,
        }
        .unwrap_or(base)
    }
}

/// A sensor marking the outer volume of a portal
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
#[require(Sensor)]
pub struct PortalLayerVolume {
    /// Owning portal
    pub portal: Entity,
}

/// A sensor marking the transition volume of a portal
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
#[require(Sensor)]
pub struct PortalTransitionVolume {
    /// Owning portal
    pub portal: Entity,
}

/// One step of the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerTransition {
    /// Portal whose state changed
    pub layer:            Entity,
    /// State before
    pub from:             LayerState,
    /// State after
    pub to:               LayerState,
    /// Layers to apply to the object, `None` when they stay
    pub collision_layers: Option<CollisionLayers>,
}

/// Follows one object through the volumes of every portal it touches.
///
/// Only one portal is tracked at a time. Each tick the trigger handlers are
/// reconciled against the current overlaps, then `update_state` steps the
/// state machine one state at a time towards what the overlaps say.
#[derive(Component, Debug, Clone, Default)]
#[require(CollidingEntities)]
pub struct PortalTracker {
    layers:      TriggerHandler<Entity>,
    transitions: TriggerHandler<Entity>,
    tracked:     Option<Entity>,
    state:       LayerState,
    mode:        LayerMode,
    base:        Option<CollisionLayers>,
    handoff:     Option<Entity>,
    crossed:     Option<Entity>,
}

impl PortalTracker {
    /// A tracker in `mode`
    pub fn with_mode(mode: LayerMode) -> Self {
        Self {
            mode,
            ..default()
        }
    }

    /// The portal being tracked
    pub const fn tracked(&self) -> Option<Entity> { self.tracked }

    /// State relative to the tracked portal
    pub const fn state(&self) -> LayerState { self.state }

    /// Current mode
    pub const fn mode(&self) -> LayerMode { self.mode }

    /// Outer volumes overlapped, by portal
    pub const fn layers(&self) -> &TriggerHandler<Entity> { &self.layers }

    /// Transition volumes overlapped, by portal
    pub const fn transitions(&self) -> &TriggerHandler<Entity> { &self.transitions }

    /// Portals whose volumes the object overlaps. Between a teleport and the
    /// next `update_state` the crossed portal reads as the exit portal.
    pub fn overlapped_portals(&self) -> Vec<Entity> {
        let mut portals: Vec<Entity> = Vec::new();
        for portal in self.layers.values().chain(self.transitions.values()) {
            let portal = match self.crossed.zip(self.handoff) {
                Some((crossed, exit)) if crossed == portal => exit,
                _ => portal,
            };
            if !portals.contains(&portal) {
                portals.push(portal);
            }
        }
        portals
    }

    /// Reconciles both handlers against this tick's overlaps, returning the
    /// outer volume events followed by the transition volume events
    pub fn reconcile(
        &mut self,
        layers: impl IntoIterator<Item = (Entity, Option<Entity>)>,
        transitions: impl IntoIterator<Item = (Entity, Option<Entity>)>,
    ) -> Vec<TriggerEvent<Entity>> {
        let mut events = self.layers.reconcile(layers);
        events.extend(self.transitions.reconcile(transitions));
        events
    }

    /// Where the overlaps say the object should be.
    ///
    /// The tracked portal keeps priority: its transition volume wins over its
    /// outer volume. Right after a teleport the exit portal counts as Inside
    /// until its volumes report the overlap. Otherwise a portal whose
    /// transition is overlapped beats one whose outer volume is, lowest entity
    /// first.
    fn target(&self) -> (Option<Entity>, LayerState) {
        if let Some(tracked) = self.tracked {
            if self.transitions.contains(tracked) || self.handoff == Some(tracked) {
                return (Some(tracked), LayerState::Inside);
            }
            if self.layers.contains(tracked) {
                return (Some(tracked), LayerState::Between);
            }
        }
        if let Some(portal) = self.transitions.values().min() {
            return (Some(portal), LayerState::Inside);
        }
        self.layers
            .values()
            .min()
            .map_or((None, LayerState::Outside), |portal| (Some(portal), LayerState::Between))
    }

    /// Steps the state machine to match the overlaps, returning every step
    /// taken. `current` is the object's collision layers right now and
    /// `mapping` looks up the layers a portal hands out.
    pub fn update_state(
        &mut self,
        current: CollisionLayers,
        mapping: impl Fn(Entity) -> Option<PortalLayer>,
    ) -> Vec<LayerTransition> {
        let (portal, target) = self.target();
        self.handoff = None;
        self.crossed = None;
        let mut steps = Vec::new();

        // leave a portal that is no longer the target; the base layers carry
        // over to the next portal
        if self.tracked.is_some() && self.tracked != portal {
            self.step_to(LayerState::Outside, current, &mapping, &mut steps);
            self.tracked = None;
        }
        if let Some(portal) = portal {
            if self.base.is_none() {
                self.base = Some(current);
            }
            self.tracked = Some(portal);
            self.step_to(target, current, &mapping, &mut steps);
        }
        if self.state == LayerState::Outside {
            self.tracked = None;
            self.base = None;
        }
        steps
    }

    fn step_to(
        &mut self,
        target: LayerState,
        current: CollisionLayers,
        mapping: &impl Fn(Entity) -> Option<PortalLayer>,
        steps: &mut Vec<LayerTransition>,
    ) {
        let Some(layer) = self.tracked else {
            return;
        };
        while self.state != target {
            let from = self.state;
            let to = from.step_towards(target);
            self.state = to;
            steps.push(LayerTransition {
                layer,
                from,
                to,
                collision_layers: self.layers_for(layer, to, current, mapping),
            });
        }
    }

    fn layers_for(
        &self,
        layer: Entity,
        state: LayerState,
        current: CollisionLayers,
        mapping: &impl Fn(Entity) -> Option<PortalLayer>,
    ) -> Option<CollisionLayers> {
        if self.mode == LayerMode::Track {
            return None;
        }
        let base = self.base.unwrap_or(current);
        Some(mapping(layer).map_or(base, |mapping| mapping.layers_for(state, base)))
    }

    /// Switches mode. The object first returns to Outside under the old mode,
    /// then the state is derived afresh under the new one.
    pub fn set_mode(
        &mut self,
        mode: LayerMode,
        current: CollisionLayers,
        mapping: impl Fn(Entity) -> Option<PortalLayer>,
    ) -> Vec<LayerTransition> {
        if mode == self.mode {
            return Vec::new();
        }
        let mut steps = Vec::new();
        self.step_to(LayerState::Outside, current, &mapping, &mut steps);
        let reverted = steps
            .iter()
            .rev()
            .find_map(|step| step.collision_layers)
            .unwrap_or(current);
        self.tracked = None;
        self.base = None;
        self.mode = mode;
        steps.extend(self.update_state(reverted, mapping));
        steps
    }

    /// Hands tracking over to the exit portal after a teleport. The object
    /// stays Inside; the returned step carries the exit portal's inside layers.
    pub fn on_teleported(
        &mut self,
        to: Entity,
        current: CollisionLayers,
        mapping: impl Fn(Entity) -> Option<PortalLayer>,
    ) -> LayerTransition {
        let from = self.state;
        self.crossed = self.tracked.filter(|crossed| *crossed != to);
        self.tracked = Some(to);
        self.state = LayerState::Inside;
        self.handoff = Some(to);
        LayerTransition {
            layer: to,
            from,
            to: LayerState::Inside,
            collision_layers: self.layers_for(to, LayerState::Inside, current, &mapping),
        }
    }

    /// Portal the object may teleport through this tick
    pub const fn teleport_candidate(&self) -> Option<Entity> {
        match (self.state, self.tracked) {
            (LayerState::Inside, Some(portal)) => Some(portal),
            _ => None,
        }
    }

    /// Forgets every overlap and returns to Outside, restoring the base layers
    pub fn release(&mut self, current: CollisionLayers) -> Option<CollisionLayers> {
        let restore = (self.mode == LayerMode::Remap).then_some(self.base).flatten();
        self.layers.clear();
        self.transitions.clear();
        self.tracked = None;
        self.state = LayerState::Outside;
        self.base = None;
        self.handoff = None;
        self.crossed = None;
        restore.filter(|layers| *layers != current)
    }
}
