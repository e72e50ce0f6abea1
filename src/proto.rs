//! Generated gRPC code, built from `proto/broker.proto` and `proto/feed.proto`.

pub mod broker {
    tonic::include_proto!("broker");
}

pub mod feed {
    tonic::include_proto!("feed");
}
