pub mod statistics_queries;

pub use statistics_queries::{
    count_series_metadata, metadata_id, point_id_at, points_for_series, series_metadata,
    SeriesMetadataRow,
};
