/// Find a device by index or case-insensitive name substring
pub fn find_device(devices: &[String], search: &str) -> Option<usize> {
    if let Ok(index) = search.trim().parse::<usize>() {
        return (index < devices.len()).then_some(index);
    }

    let search_lower = search.to_lowercase();
    devices
        .iter()
        .position(|device| device.to_lowercase().contains(&search_lower))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<String> {
        vec!["IAC Driver Bus 1".to_string(), "Arturia KeyStep 37".to_string()]
    }

    #[test]
    fn test_find_by_index() {
        assert_eq!(find_device(&devices(), "1"), Some(1));
        assert_eq!(find_device(&devices(), "2"), None);
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!(find_device(&devices(), "keystep"), Some(1));
        assert_eq!(find_device(&devices(), "bus"), Some(0));
        assert_eq!(find_device(&devices(), "launchpad"), None);
    }
}
