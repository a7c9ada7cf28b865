pub(crate) mod bson_utils;
