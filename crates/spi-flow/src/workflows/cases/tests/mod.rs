mod common;
mod documents;
mod pricing;
