#![allow(unused)]

mod tracing;
