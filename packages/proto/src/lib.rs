//! Generated gRPC bindings for services the attendance service talks to.

pub mod subject {
    tonic::include_proto!("subject");
}
