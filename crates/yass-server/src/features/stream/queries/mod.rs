pub mod open_stream;

pub use open_stream::{
    OpenStreamError, OpenStreamQuery, StemKind, StemStream, STREAM_CHUNK_SIZE,
    STREAM_CONTENT_TYPE,
};
