mod scheduler;
mod service;
