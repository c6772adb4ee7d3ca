pub mod inventory_movement;
pub mod item;
pub mod order;
