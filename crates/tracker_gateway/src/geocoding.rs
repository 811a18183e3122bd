mod nominatim_geocoder;

pub use nominatim_geocoder::*;
