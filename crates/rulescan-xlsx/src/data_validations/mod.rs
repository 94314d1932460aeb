mod read;

pub use read::read_data_validations_from_worksheet_xml;
