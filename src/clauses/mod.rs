mod in_list;

pub use in_list::InList;
