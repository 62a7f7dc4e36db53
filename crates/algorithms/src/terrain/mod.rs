//! Terrain-derived routing surfaces
//!
//! - Velocity: Manning flow velocity by channel/hillslope regime
//! - Slowness: `1 / velocity`, the cost surface used for travel time

mod velocity;

pub use velocity::{
    manning_velocity, slowness_field, velocity_field, FlowRegime, VelocityField, VelocityParams,
};
