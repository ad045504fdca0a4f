mod delivery_test;
mod email_test;
mod helpers;
