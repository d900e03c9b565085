mod codec;
mod corpus;
mod dataset;
mod midi_exporter;
mod midi_importer;
mod model;
mod util;

pub use codec::*;
pub use corpus::*;
pub use dataset::*;
pub use midi_exporter::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::song::*;
pub use model::token::*;
pub use util::*;
