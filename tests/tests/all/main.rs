mod in_memory;
mod polling;
