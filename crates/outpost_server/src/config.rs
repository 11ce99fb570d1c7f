use std::time::Duration;

use outpost_network::NetworkSettings;

use crate::descriptor::MapDescriptor;

/// Tuning for the world simulation and the game service.
#[derive(Clone, Debug)]
pub struct GameSettings {
    /// One simulation step per period.
    ///
    /// # Default Value
    ///
    /// `50` ms (20 ticks per second)
    pub tick_period: Duration,
    /// The radius of every session's interest area.
    ///
    /// # Default Value
    ///
    /// `50.0` world units
    pub interest_radius: f32,
    /// The side length of one spatial grid cell.
    ///
    /// # Default Value
    ///
    /// `10.0` world units
    pub cell_size: f32,
    /// How long a disconnected session's character is parked before it is
    /// destroyed.
    ///
    /// # Default Value
    ///
    /// `30` seconds
    pub grace_period: Duration,
    /// How often the parking sweeper evicts expired characters.
    ///
    /// # Default Value
    ///
    /// `5` seconds
    pub park_sweep_interval: Duration,
    /// When set, a failed login registers the credentials and retries once.
    ///
    /// # Default Value
    ///
    /// `false`
    pub allow_auto_register: bool,
    /// How many returned character instances each map retains for reuse.
    ///
    /// # Default Value
    ///
    /// `256`
    pub character_pool_capacity: usize,
    /// How many returned monster instances each map retains for reuse.
    ///
    /// # Default Value
    ///
    /// `1024`
    pub monster_pool_capacity: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(50),
            interest_radius: 50.0,
            cell_size: 10.0,
            grace_period: Duration::from_secs(30),
            park_sweep_interval: Duration::from_secs(5),
            allow_auto_register: false,
            character_pool_capacity: 256,
            monster_pool_capacity: 1024,
        }
    }
}

/// Everything the server needs to start.
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    pub network: NetworkSettings,
    pub game: GameSettings,
    /// The world to load. `None` falls back to
    /// [`MapDescriptor::default_map`].
    pub descriptor: Option<MapDescriptor>,
}
