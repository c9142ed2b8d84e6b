pub mod cell_table;

pub use cell_table::{
    read_grid_csv, read_grid_csv_from_reader, read_regions_csv, read_regions_csv_from_reader,
    write_class_grid_csv, write_fold_assignment_csv,
};
