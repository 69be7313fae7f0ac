pub mod rating_service;
