pub mod dbdocs;
