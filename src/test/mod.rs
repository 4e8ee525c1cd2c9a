mod builder;
mod observers;
mod ordering;
mod responses;
mod scenario_spec;
