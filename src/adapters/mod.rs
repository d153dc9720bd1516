//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter       | Implements             | Connects to                 |
//! |---------------|------------------------|-----------------------------|
//! | `config_file` | ConfigPort             | JSON file on disk           |
//! | `device_id`   | (identity)             | link-layer address          |
//! | `indicator`   | IndicatorPort          | log output / GPIO pins      |
//! | `log_sink`    | EventSink              | `log` facade                |
//! | `loopback`    | Link                   | in-process handlers         |
//! | `registry`    | ResourceHandler        | local registration service  |
//! | `time`        | (clock)                | `std::time::Instant`        |
//! | `udp_link`    | Link, EventSink        | JSON datagrams over UDP     |

pub mod config_file;
pub mod device_id;
pub mod indicator;
pub mod log_sink;
pub mod loopback;
pub mod registry;
pub mod time;
pub mod udp_link;
