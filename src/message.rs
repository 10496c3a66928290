pub mod status_frame;
