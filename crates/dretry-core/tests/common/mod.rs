#![allow(dead_code)]

pub mod grpc_server;
pub mod scripted;
