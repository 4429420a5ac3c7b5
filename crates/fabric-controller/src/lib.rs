pub mod accept;
pub mod link_controller;
pub mod link_table;
pub mod network;
pub mod router_links;
pub mod transport;

pub use link_controller::LinkController;
pub use network::Network;
