pub mod collect;
pub mod prepare_rule;
pub mod run;
pub mod significance;
pub mod simulate;
