pub mod json_select;
