pub mod correlation;
pub mod robust;
