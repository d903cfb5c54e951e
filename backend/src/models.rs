pub use shared::{
    ApiError, BoundingBox, Coordinate, GeocodeResponse, MIN_QUERY_LEN, Place, RouteRequest,
    RouteResponse, SUGGESTION_LIMIT,
};
