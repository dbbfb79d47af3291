pub(crate) mod dag;

pub(crate) mod logging;

pub(crate) mod mem_db;

pub(crate) mod output;

pub(crate) mod runtime;
