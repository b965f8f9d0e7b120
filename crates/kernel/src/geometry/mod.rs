pub mod point;
pub mod vector;
pub mod transform;
pub mod curves;
pub mod surfaces;
pub mod intersection;
pub mod surface_intersection;
pub mod marching;
