mod end_to_end;
mod helper;
mod properties;
mod tabling;
