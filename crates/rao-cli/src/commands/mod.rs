pub mod case;
pub mod optimize;
pub mod params;
pub mod util;
pub mod validate;
