#![doc = "lesson-docs-core: conversion engine and pipelines for lesson-docs."]

//! This crate holds the markup-to-document conversion engine and everything
//! around it that is not CLI glue: DOCX packaging, merging, the working
//! directory layout and the batch pipeline.
//!
//! # Usage
//! Parse a page with [`markup::parse_document`], convert it with
//! [`convert::convert_lesson`], then package it with [`docx::DocxAssembler`].
//! The [`pipeline`] module wires these together for a whole working directory.

pub mod classify;
pub mod contract;
pub mod convert;
pub mod docx;
pub mod error;
pub mod fetch;
pub mod image_info;
pub mod inline;
pub mod markup;
pub mod media;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod style;
pub mod workdir;
